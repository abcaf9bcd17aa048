use tracing::warn;
use veridex_core::ProviderDescriptor;

/// Resolves which provider identity should answer a query.
///
/// The requested provider wins when it exists and is enabled. A requested
/// but disabled (or unknown) provider is substituted with the first enabled
/// descriptor in configured order — logged, not an error. Returns `None`
/// only when no provider is enabled at all.
pub fn resolve_provider<'a>(
    requested: Option<&str>,
    providers: &'a [ProviderDescriptor],
) -> Option<&'a ProviderDescriptor> {
    if let Some(key) = requested {
        if let Some(p) = providers.iter().find(|p| p.key == key) {
            if p.enabled {
                return Some(p);
            }
        }
        let fallback = providers.iter().find(|p| p.enabled)?;
        warn!(
            requested = key,
            substituted = %fallback.key,
            "Requested provider unavailable, substituting first enabled"
        );
        return Some(fallback);
    }

    providers.iter().find(|p| p.enabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(key: &str, enabled: bool) -> ProviderDescriptor {
        ProviderDescriptor {
            key: key.to_string(),
            label: key.to_uppercase(),
            model_id: format!("model-{key}"),
            enabled,
        }
    }

    #[test]
    fn requested_enabled_provider_wins() {
        let providers = vec![descriptor("thorough", true), descriptor("fast", true)];
        let p = resolve_provider(Some("fast"), &providers).unwrap();
        assert_eq!(p.key, "fast");
    }

    #[test]
    fn disabled_request_substitutes_first_enabled() {
        let providers = vec![descriptor("thorough", false), descriptor("fast", true)];
        let p = resolve_provider(Some("thorough"), &providers).unwrap();
        assert_eq!(p.key, "fast");
    }

    #[test]
    fn unknown_request_substitutes_first_enabled() {
        let providers = vec![descriptor("thorough", true)];
        let p = resolve_provider(Some("nonexistent"), &providers).unwrap();
        assert_eq!(p.key, "thorough");
    }

    #[test]
    fn no_request_picks_first_enabled_in_order() {
        let providers = vec![descriptor("a", false), descriptor("b", true), descriptor("c", true)];
        let p = resolve_provider(None, &providers).unwrap();
        assert_eq!(p.key, "b");
    }

    #[test]
    fn all_disabled_resolves_to_none() {
        let providers = vec![descriptor("a", false), descriptor("b", false)];
        assert!(resolve_provider(Some("a"), &providers).is_none());
        assert!(resolve_provider(None, &providers).is_none());
    }

    #[test]
    fn empty_provider_list_resolves_to_none() {
        assert!(resolve_provider(None, &[]).is_none());
    }
}
