use crate::Error;

/// Conversion into a list of channel names, accepted by `join` and `leave`
pub trait IntoChannels {
    /// Raw channel names, not yet normalized
    fn into_channels(self) -> Vec<String>;
}

impl IntoChannels for &str {
    fn into_channels(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoChannels for String {
    fn into_channels(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoChannels for &String {
    fn into_channels(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<S: Into<String>> IntoChannels for Vec<S> {
    fn into_channels(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<S: AsRef<str>> IntoChannels for &[S] {
    fn into_channels(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> IntoChannels for [S; N] {
    fn into_channels(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

/// Lowercase a channel name. Names must start with `#` and have at least one more character.
pub(crate) fn normalize_channel(channel: &str) -> Result<String, Error> {
    if channel.len() < 2 || !channel.starts_with('#') {
        return Err(Error::InvalidChannel(channel.to_string()));
    }
    Ok(channel.to_lowercase())
}

pub(crate) fn normalize_channels<C: IntoChannels>(channels: C) -> Result<Vec<String>, Error> {
    channels
        .into_channels()
        .iter()
        .map(|channel| normalize_channel(channel))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_channel("#FooBar").unwrap(), "#foobar");
        assert!(matches!(
            normalize_channel("foobar"),
            Err(Error::InvalidChannel(_))
        ));
        assert!(normalize_channel("#").is_err());
        assert_eq!(
            normalize_channels(["#A", "#b"]).unwrap(),
            vec!["#a".to_string(), "#b".to_string()]
        );
        assert!(normalize_channels(vec!["#a", "b"]).is_err());
        assert!(normalize_channels(Vec::<String>::new()).unwrap().is_empty());
    }
}
