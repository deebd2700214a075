use std::{fmt, marker::PhantomData, str::FromStr};

use serde::{de, Deserializer};

/// Env vars arrive as a single comma-separated string, config files and cli args as sequences
pub fn deserialize_vec_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_vec_from_str(deserializer)
}

/// Same as [`deserialize_vec_string`], parsing every item with `FromStr`
pub fn deserialize_vec_from_str<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    struct StringOrVec<T>(PhantomData<T>);

    impl<'de, T> de::Visitor<'de> for StringOrVec<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        type Value = Vec<T>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a comma-separated string or a sequence of strings")
        }

        fn visit_str<E>(self, value: &str) -> Result<Vec<T>, E>
        where
            E: de::Error,
        {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<T>().map_err(E::custom))
                .collect()
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Vec<T>, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut vec = Vec::new();
            while let Some(elem) = seq.next_element::<String>()? {
                vec.push(elem.trim().parse::<T>().map_err(de::Error::custom)?);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec(PhantomData))
}

#[cfg(test)]
mod test {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct Levels {
        #[serde(deserialize_with = "super::deserialize_vec_string")]
        log_level: Vec<String>,
    }

    #[derive(Deserialize, Debug)]
    struct Numbers {
        #[serde(deserialize_with = "super::deserialize_vec_from_str")]
        values: Vec<u32>,
    }

    #[test]
    fn string_or_sequence() {
        let from_str: Levels =
            serde_json::from_str(r#"{"log_level": "info, elreader=debug"}"#).unwrap();
        assert_eq!(from_str.log_level, ["info", "elreader=debug"]);

        let from_seq: Levels =
            serde_json::from_str(r#"{"log_level": ["info", "elreader=debug"]}"#).unwrap();
        assert_eq!(from_seq.log_level, from_str.log_level);
    }

    #[test]
    fn parses_items() {
        let numbers: Numbers = serde_json::from_str(r#"{"values": "1, 2,3,"}"#).unwrap();
        assert_eq!(numbers.values, [1, 2, 3]);

        serde_json::from_str::<Numbers>(r#"{"values": ["1", "x"]}"#).unwrap_err();
    }
}
