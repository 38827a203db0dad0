use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// A provider-qualified id parsed from one of the composite string forms
/// accepted at the system boundary (`"tmdb:603"`, `"kitsu:1376"`, a bare
/// IMDb `"tt…"` id, …).
///
/// All prefix parsing happens here; downstream code only ever sees the
/// tagged value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParsedId {
    Tmdb(u64),
    Tvdb(u64),
    Imdb(String),
    Mal(u64),
    Kitsu(u64),
    Tvmaze(u64),
    Anidb(u64),
    Anilist(u64),
}

impl ParsedId {
    /// The namespace prefix used in the composite string form.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Tmdb(_) => "tmdb",
            Self::Tvdb(_) => "tvdb",
            Self::Imdb(_) => "imdb",
            Self::Mal(_) => "mal",
            Self::Kitsu(_) => "kitsu",
            Self::Tvmaze(_) => "tvmaze",
            Self::Anidb(_) => "anidb",
            Self::Anilist(_) => "anilist",
        }
    }
}

fn parse_numeric(namespace: &str, raw: &str) -> Result<u64, ModelError> {
    raw.parse::<u64>().map_err(|_| {
        ModelError::InvalidId(format!("{namespace}:{raw} is not numeric"))
    })
}

impl FromStr for ParsedId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Bare IMDb ids circulate without a namespace prefix.
        if s.len() > 2
            && s.starts_with("tt")
            && s[2..].chars().all(|c| c.is_ascii_digit())
        {
            return Ok(Self::Imdb(s.to_string()));
        }

        let Some((namespace, raw)) = s.split_once(':') else {
            return Err(ModelError::InvalidId(format!(
                "id without a recognized namespace: {s}"
            )));
        };

        match namespace {
            "tmdb" => Ok(Self::Tmdb(parse_numeric(namespace, raw)?)),
            "tvdb" => Ok(Self::Tvdb(parse_numeric(namespace, raw)?)),
            "imdb" => Ok(Self::Imdb(raw.to_string())),
            "mal" => Ok(Self::Mal(parse_numeric(namespace, raw)?)),
            "kitsu" => Ok(Self::Kitsu(parse_numeric(namespace, raw)?)),
            "tvmaze" => Ok(Self::Tvmaze(parse_numeric(namespace, raw)?)),
            "anidb" => Ok(Self::Anidb(parse_numeric(namespace, raw)?)),
            "anilist" => Ok(Self::Anilist(parse_numeric(namespace, raw)?)),
            other => Err(ModelError::InvalidId(format!(
                "unknown id namespace: {other}"
            ))),
        }
    }
}

impl fmt::Display for ParsedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imdb(id) => write!(f, "{id}"),
            Self::Tmdb(id) => write!(f, "tmdb:{id}"),
            Self::Tvdb(id) => write!(f, "tvdb:{id}"),
            Self::Mal(id) => write!(f, "mal:{id}"),
            Self::Kitsu(id) => write!(f, "kitsu:{id}"),
            Self::Tvmaze(id) => write!(f, "tvmaze:{id}"),
            Self::Anidb(id) => write!(f, "anidb:{id}"),
            Self::Anilist(id) => write!(f, "anilist:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespaced_ids() {
        assert_eq!("tmdb:603".parse::<ParsedId>().unwrap(), ParsedId::Tmdb(603));
        assert_eq!(
            "kitsu:1376".parse::<ParsedId>().unwrap(),
            ParsedId::Kitsu(1376)
        );
        assert_eq!("mal:1535".parse::<ParsedId>().unwrap(), ParsedId::Mal(1535));
    }

    #[test]
    fn parses_bare_imdb_ids() {
        assert_eq!(
            "tt0110912".parse::<ParsedId>().unwrap(),
            ParsedId::Imdb("tt0110912".to_string())
        );
        assert_eq!(
            "imdb:tt0877057".parse::<ParsedId>().unwrap(),
            ParsedId::Imdb("tt0877057".to_string())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<ParsedId>().is_err());
        assert!("ttnotanid".parse::<ParsedId>().is_err());
        assert!("hbo:1234".parse::<ParsedId>().is_err());
        assert!("tmdb:abc".parse::<ParsedId>().is_err());
    }

    #[test]
    fn round_trips_through_display() {
        for raw in ["tmdb:603", "tt0110912", "anilist:21"] {
            let parsed = raw.parse::<ParsedId>().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
    }
}
