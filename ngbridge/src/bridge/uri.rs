//! Change-event URIs: `ngc://<catalog path>[#<feature id>]`.

/// A change-event URI split into its source path and optional feature id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeUri<'a> {
    /// Everything before `#`.
    pub source: &'a str,
    /// The fragment, when it is a valid feature id.
    pub feature_id: Option<i64>,
}

impl<'a> ChangeUri<'a> {
    pub fn parse(uri: &'a str) -> Self {
        match uri.rsplit_once('#') {
            Some((source, fragment)) => Self {
                source,
                feature_id: fragment.trim().parse().ok(),
            },
            None => Self {
                source: uri,
                feature_id: None,
            },
        }
    }
}

/// Returns true if `uri` is `prefix` itself or lies below it.
///
/// `ngc://tmp` covers `ngc://tmp`, `ngc://tmp/layer` and `ngc://tmp#3` but
/// not `ngc://tmpfiles`. An empty prefix covers nothing.
pub fn is_under(uri: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    match uri.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('#'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_feature_id() {
        let uri = ChangeUri::parse("ngc://store/roads#5");
        assert_eq!(uri.source, "ngc://store/roads");
        assert_eq!(uri.feature_id, Some(5));
    }

    #[test]
    fn test_parse_without_fragment() {
        let uri = ChangeUri::parse("ngc://store/roads");
        assert_eq!(uri.source, "ngc://store/roads");
        assert_eq!(uri.feature_id, None);
    }

    #[test]
    fn test_parse_bad_fragment() {
        let uri = ChangeUri::parse("ngc://store/roads#abc");
        assert_eq!(uri.source, "ngc://store/roads");
        assert_eq!(uri.feature_id, None);
    }

    #[test]
    fn test_is_under() {
        assert!(is_under("ngc://tmp", "ngc://tmp"));
        assert!(is_under("ngc://tmp/edit", "ngc://tmp/"));
        assert!(is_under("ngc://tmp#3", "ngc://tmp"));
        assert!(!is_under("ngc://tmpfiles/x", "ngc://tmp"));
        assert!(!is_under("ngc://store", "ngc://tmp"));
        assert!(!is_under("ngc://store", ""));
    }
}
