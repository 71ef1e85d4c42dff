//! Deterministic, tenant-prefixed cache keys.
//!
//! Key layout: `tenant_<id>:<domain>:<rest>[:<query>]` where `<rest>` is the
//! resource path after the domain segment joined with `:` (or `list` for the
//! collection itself) and `<query>` is the sorted `k=v` list.

use assistsync_core::TenantId;

use super::policy::CacheDomain;

/// Segment used for the collection root (`/contacts`).
pub const LIST_SEGMENT: &str = "list";

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    pub fn tenant_prefix(tenant_id: TenantId) -> String {
        format!("tenant_{tenant_id}:")
    }

    /// Key for an explicit resource, e.g. `build(t, AiState, &["42"])`.
    pub fn build(tenant_id: TenantId, domain: CacheDomain, segments: &[&str]) -> String {
        let mut key = format!("{}{}:", Self::tenant_prefix(tenant_id), domain.as_str());
        if segments.is_empty() {
            key.push_str(LIST_SEGMENT);
        } else {
            key.push_str(&segments.join(":"));
        }
        key
    }

    /// Key for an HTTP read. `path` includes the domain segment (`/contacts/7`).
    ///
    /// Query parameters are sorted; empty values and the `tenant` parameter are
    /// dropped since the tenant is already the key prefix.
    pub fn for_request(tenant_id: TenantId, domain: CacheDomain, path: &str, query: Option<&str>) -> String {
        let rest: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).skip(1).collect();
        let mut key = Self::build(tenant_id, domain, &rest);

        let normalized = normalize_query(query.unwrap_or_default());
        if !normalized.is_empty() {
            key.push(':');
            key.push_str(&normalized);
        }
        key
    }

    /// Pattern covering every key of `domain` for the tenant.
    pub fn domain_pattern(tenant_id: TenantId, domain: CacheDomain) -> String {
        format!("{}{}:*", Self::tenant_prefix(tenant_id), domain.as_str())
    }

    /// Pattern covering every key of the tenant.
    pub fn tenant_pattern(tenant_id: TenantId) -> String {
        format!("{}*", Self::tenant_prefix(tenant_id))
    }

    /// A key (or pattern) belongs to a tenant iff it starts with exactly that
    /// tenant's prefix. `tenant_1:` never matches `tenant_12:...`.
    pub fn belongs_to(key: &str, tenant_id: TenantId) -> bool {
        key.starts_with(&Self::tenant_prefix(tenant_id))
    }
}

fn normalize_query(query: &str) -> String {
    let mut pairs: Vec<(&str, &str)> = query
        .split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            if k.is_empty() || v.is_empty() || k == "tenant" {
                None
            } else {
                Some((k, v))
            }
        })
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn request_key_drops_tenant_param_and_sorts_query() {
        let key = CacheKeyBuilder::for_request(
            TenantId::new(9),
            CacheDomain::Contacts,
            "/contacts",
            Some("tenant=9&search=ana&page=1&status="),
        );
        assert_eq!(key, "tenant_9:contacts:list:page=1&search=ana");
    }

    #[test]
    fn page_search_and_status_produce_distinct_keys() {
        let t = TenantId::new(9);
        let a = CacheKeyBuilder::for_request(t, CacheDomain::Contacts, "/contacts", Some("page=1"));
        let b = CacheKeyBuilder::for_request(t, CacheDomain::Contacts, "/contacts", Some("page=2"));
        let c = CacheKeyBuilder::for_request(t, CacheDomain::Contacts, "/contacts", Some("page=1&search=x"));
        let d = CacheKeyBuilder::for_request(t, CacheDomain::Contacts, "/contacts", Some("page=1&status=open"));
        let all = [a, b, c, d];
        for (i, x) in all.iter().enumerate() {
            for y in &all[i + 1..] {
                assert_ne!(x, y);
            }
        }
    }

    #[test]
    fn nested_paths_become_segments() {
        let key = CacheKeyBuilder::for_request(TenantId::new(3), CacheDomain::Conversations, "/conversations/42/ai-state", None);
        assert_eq!(key, "tenant_3:conversations:42:ai-state");
        assert_eq!(
            CacheKeyBuilder::build(TenantId::new(3), CacheDomain::AiState, &["42"]),
            "tenant_3:ai_state:42"
        );
    }

    #[test]
    fn patterns_carry_tenant_prefix() {
        assert_eq!(CacheKeyBuilder::domain_pattern(TenantId::new(9), CacheDomain::Contacts), "tenant_9:contacts:*");
        assert_eq!(CacheKeyBuilder::tenant_pattern(TenantId::new(9)), "tenant_9:*");
    }

    #[test]
    fn prefix_of_another_tenant_id_does_not_belong() {
        assert!(!CacheKeyBuilder::belongs_to("tenant_12:contacts:list", TenantId::new(1)));
        assert!(CacheKeyBuilder::belongs_to("tenant_12:contacts:list", TenantId::new(12)));
        assert!(!CacheKeyBuilder::belongs_to("contacts:list", TenantId::new(12)));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        /// Property: every built key belongs to its tenant and to no other tenant.
        #[test]
        fn built_keys_belong_only_to_their_tenant(
            t in 1i64..10_000,
            other in 1i64..10_000,
            domain_idx in 0usize..10,
            path in "(/[a-z0-9-]{1,8}){0,4}",
            query in "([a-z]{1,5}=[a-z0-9]{0,4}&?){0,4}",
        ) {
            let tenant = TenantId::new(t);
            let domain = CacheDomain::ALL[domain_idx];
            let key = CacheKeyBuilder::for_request(tenant, domain, &format!("/{}{}", domain.as_str(), path), Some(&query));

            prop_assert!(CacheKeyBuilder::belongs_to(&key, tenant));
            if other != t {
                prop_assert!(!CacheKeyBuilder::belongs_to(&key, TenantId::new(other)));
            }
        }

        /// Property: query parameter order never changes the key.
        #[test]
        fn query_order_is_irrelevant(a in "[a-m]{1,4}", b in "[n-z]{1,4}", va in "[0-9]{1,3}", vb in "[0-9]{1,3}") {
            let t = TenantId::new(9);
            let q1 = format!("{a}={va}&{b}={vb}");
            let q2 = format!("{b}={vb}&{a}={va}");
            prop_assert_eq!(
                CacheKeyBuilder::for_request(t, CacheDomain::Forms, "/forms", Some(&q1)),
                CacheKeyBuilder::for_request(t, CacheDomain::Forms, "/forms", Some(&q2))
            );
        }
    }
}
