//! Vendor discovery: asking the model for local vendors, and the flat JSON
//! cache that spares repeated lookups for the same service.

use std::path::{Path, PathBuf};

use crate::anthropic::{MessageSender, MessagesRequest, extract_json};
use crate::config::LlmSettings;
use crate::error::{QuotatoError, Result};
use crate::vendor::{Vendor, slugify};

/// Most vendors the finder asks for.
const MAX_VENDORS: u32 = 8;

#[allow(async_fn_in_trait)]
pub trait VendorDiscovery {
    async fn find_vendors(&self, service: &str, location: &str) -> Result<Vec<Vendor>>;
}

/// Finds vendors by asking the model for a JSON array of company records.
pub struct LlmVendorFinder<S> {
    sender: S,
    settings: LlmSettings,
    min_count: u32,
}

impl<S: MessageSender> LlmVendorFinder<S> {
    pub fn new(sender: S, settings: LlmSettings, min_count: u32) -> Self {
        Self {
            sender,
            settings,
            min_count: min_count.clamp(1, MAX_VENDORS),
        }
    }

    fn prompt(&self, service: &str, location: &str) -> String {
        let count = self.min_count;
        format!(
            "I'm in {location}.\n\
             \n\
             Find professional {service} companies (minimum {count}, maximum {MAX_VENDORS}) that serve this area.\n\
             \n\
             For each company return a single JSON object with exactly these keys \
             (all strings except services, which is an array of short strings):\n\
             \n\
             {{\"name\": \"\", \"email\": \"\", \"phone\": \"\", \"address\": \"\", \"website\": \"\", \
             \"contact_form_url\": \"\", \"services\": [], \"support_notes\": \"\"}}\n\
             \n\
             Combine them into a JSON array, no extra text before or after.\n\
             Leave a key empty rather than guessing an email address or form URL.\n\
             Prefer companies within 30 miles of downtown {location}; if you must include one \
             farther away, note the distance in support_notes.\n\
             Limit support_notes to one sentence.\n\
             \n\
             If you can't find at least {count} valid entries, say \"FEWER THAN {count} RESULTS\" \
             instead of the JSON."
        )
    }
}

impl<S: MessageSender> VendorDiscovery for LlmVendorFinder<S> {
    async fn find_vendors(&self, service: &str, location: &str) -> Result<Vec<Vendor>> {
        let req = MessagesRequest::user(
            &self.settings.model,
            self.settings.max_tokens.max(2048),
            self.prompt(service, location),
        );
        let text = self.sender.send_message(&req).await?.text()?;
        parse_vendor_list(&text)
    }
}

/// Parses the model's vendor list, dropping records without a name.
pub fn parse_vendor_list(text: &str) -> Result<Vec<Vendor>> {
    if text.contains("FEWER THAN") && !text.contains('[') {
        return Err(QuotatoError::Discovery(text.trim().to_string()));
    }
    let vendors: Vec<Vendor> = serde_json::from_str(extract_json(text))
        .map_err(|e| QuotatoError::Discovery(format!("unparseable vendor list: {e}")))?;

    let total = vendors.len();
    let vendors: Vec<Vendor> = vendors
        .into_iter()
        .filter(|v| !v.name.trim().is_empty())
        .collect();
    if vendors.len() < total {
        tracing::warn!(dropped = total - vendors.len(), "vendor records without a name dropped");
    }
    Ok(vendors)
}

/// Flat JSON file per service type holding the last discovery result.
#[derive(Debug, Clone)]
pub struct VendorCache {
    dir: PathBuf,
}

impl VendorCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<dir>/<service-slug>_vendors.json`
    pub fn path_for(&self, service: &str) -> PathBuf {
        let slug = slugify(service).replace('-', "_");
        let stem = if slug.is_empty() { "vendors".to_string() } else { format!("{slug}_vendors") };
        self.dir.join(format!("{stem}.json"))
    }

    /// Cached vendors for `service`, `None` when nothing is cached.
    pub fn load(&self, service: &str) -> Result<Option<Vec<Vendor>>> {
        let path = self.path_for(service);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| QuotatoError::Persistence(format!("{}: {e}", path.display())))?;
        let vendors = serde_json::from_str(&contents)
            .map_err(|e| QuotatoError::Persistence(format!("{}: {e}", path.display())))?;
        Ok(Some(vendors))
    }

    pub fn save(&self, service: &str, vendors: &[Vendor]) -> Result<PathBuf> {
        let path = self.path_for(service);
        write_json(&path, vendors)?;
        tracing::info!(count = vendors.len(), path = %path.display(), "saved vendors");
        Ok(path)
    }
}

fn write_json(path: &Path, vendors: &[Vendor]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(vendors)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Serves vendors from the cache, falling back to `inner` when the cache is
/// missing, unreadable, or regeneration is requested.
///
/// Without an inner finder a cache miss yields an empty list.
pub struct CachedDiscovery<D> {
    cache: VendorCache,
    inner: Option<D>,
    regenerate: bool,
}

impl<D: VendorDiscovery> CachedDiscovery<D> {
    pub fn new(cache: VendorCache, inner: Option<D>, regenerate: bool) -> Self {
        Self {
            cache,
            inner,
            regenerate,
        }
    }
}

impl<D: VendorDiscovery> VendorDiscovery for CachedDiscovery<D> {
    async fn find_vendors(&self, service: &str, location: &str) -> Result<Vec<Vendor>> {
        if !self.regenerate {
            match self.cache.load(service) {
                Ok(Some(vendors)) => {
                    tracing::info!(count = vendors.len(), "using cached vendors");
                    return Ok(vendors);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "vendor cache unreadable, treating as miss"),
            }
        }

        let Some(inner) = &self.inner else {
            tracing::warn!(service, "no cached vendors and discovery is cache-only");
            return Ok(Vec::new());
        };

        tracing::info!(service, location, "generating new vendor data");
        let vendors = inner.find_vendors(service, location).await?;
        if vendors.is_empty() {
            tracing::warn!("discovery returned no vendors");
            return Ok(vendors);
        }
        if let Err(e) = self.cache.save(service, &vendors) {
            tracing::warn!(error = %e, "failed to save vendor cache");
        }
        Ok(vendors)
    }
}

/// Fixed vendor list, for tests.
#[cfg(test)]
pub struct StaticDiscovery(pub Vec<Vendor>);

#[cfg(test)]
impl VendorDiscovery for StaticDiscovery {
    async fn find_vendors(&self, _service: &str, _location: &str) -> Result<Vec<Vendor>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anthropic::AnthropicError;
    use crate::anthropic::types::{ContentBlock, MessagesResponse, Usage};
    use std::cell::Cell;

    struct MockClient {
        text: String,
        calls: Cell<u32>,
    }

    impl MockClient {
        fn ok(text: &str) -> Self {
            Self {
                text: text.to_string(),
                calls: Cell::new(0),
            }
        }
    }

    impl MessageSender for MockClient {
        async fn send_message(
            &self,
            _req: &MessagesRequest,
        ) -> std::result::Result<MessagesResponse, AnthropicError> {
            self.calls.set(self.calls.get() + 1);
            Ok(MessagesResponse {
                id: "mock".into(),
                content: vec![ContentBlock {
                    content_type: "text".into(),
                    text: self.text.clone(),
                }],
                model: "mock".into(),
                stop_reason: Some("end_turn".into()),
                usage: Usage {
                    input_tokens: 0,
                    output_tokens: 0,
                },
            })
        }
    }

    fn sample_vendors() -> Vec<Vendor> {
        vec![
            Vendor {
                email: Some("hello@clearview.test".into()),
                phone: Some("206-555-0100".into()),
                services: vec!["window replacement".into()],
                ..Vendor::named("Clearview Windows")
            },
            Vendor {
                contact_form_url: Some("https://pane.test/quote".into()),
                ..Vendor::named("Pane & Simple")
            },
            Vendor::named("No Contact Glass"),
        ]
    }

    fn finder(text: &str) -> LlmVendorFinder<MockClient> {
        LlmVendorFinder::new(MockClient::ok(text), LlmSettings::default(), 5)
    }

    #[tokio::test]
    async fn llm_finder_parses_fenced_array() {
        let f = finder(
            "```json\n[{\"name\": \"Rain City Plumbing\", \"email\": \"rc@test\"}, {\"name\": \"\"}]\n```",
        );
        let vendors = f.find_vendors("plumbing", "Seattle").await.unwrap();
        assert_eq!(vendors.len(), 1);
        assert_eq!(vendors[0].name, "Rain City Plumbing");
    }

    #[tokio::test]
    async fn llm_finder_reports_too_few_results() {
        let err = finder("FEWER THAN 5 RESULTS")
            .find_vendors("plumbing", "Nowhere")
            .await
            .unwrap_err();
        assert!(matches!(err, QuotatoError::Discovery(_)));
    }

    #[test]
    fn prompt_names_service_and_location() {
        let f = finder("[]");
        let prompt = f.prompt("window replacement", "Portland");
        assert!(prompt.contains("window replacement"));
        assert!(prompt.contains("downtown Portland"));
        assert!(prompt.contains("FEWER THAN 5 RESULTS"));
    }

    #[test]
    fn malformed_list_is_discovery_failure() {
        assert!(matches!(
            parse_vendor_list("sorry, I can't browse"),
            Err(QuotatoError::Discovery(_))
        ));
    }

    #[test]
    fn nameless_record_is_dropped_not_fatal() {
        let vendors = parse_vendor_list(
            r#"[{"name":"Rain City Plumbing","email":"rc@test"},{"email":"x@test"},{"name":null}]"#,
        )
        .unwrap();
        assert_eq!(vendors.len(), 1);
        assert_eq!(vendors[0].name, "Rain City Plumbing");
    }

    #[test]
    fn null_services_read_as_empty() {
        let vendors =
            parse_vendor_list(r#"[{"name":"A","services":null},{"name":"B"}]"#).unwrap();
        let names: Vec<&str> = vendors.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["A", "B"]);
        assert!(vendors[0].services.is_empty());
    }

    #[test]
    fn cache_path_is_derived_from_service() {
        let cache = VendorCache::new("data");
        assert_eq!(
            cache.path_for("Window Replacement"),
            PathBuf::from("data/window_replacement_vendors.json")
        );
    }

    #[test]
    fn cache_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VendorCache::new(dir.path().join("nested"));
        assert!(cache.load("plumbing").unwrap().is_none());

        cache.save("plumbing", &sample_vendors()).unwrap();
        let loaded = cache.load("plumbing").unwrap().unwrap();
        assert_eq!(loaded, sample_vendors());
    }

    #[test]
    fn corrupt_cache_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VendorCache::new(dir.path());
        std::fs::write(cache.path_for("plumbing"), "{not json").unwrap();
        assert!(matches!(
            cache.load("plumbing"),
            Err(QuotatoError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn cached_discovery_prefers_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VendorCache::new(dir.path());
        cache.save("plumbing", &sample_vendors()).unwrap();

        let inner = finder("[{\"name\": \"Fresh\"}]");
        let discovery = CachedDiscovery::new(cache, Some(inner), false);
        let vendors = discovery.find_vendors("plumbing", "Seattle").await.unwrap();
        assert_eq!(vendors, sample_vendors());
        assert_eq!(discovery.inner.as_ref().unwrap().sender.calls.get(), 0);
    }

    #[tokio::test]
    async fn regenerate_refreshes_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VendorCache::new(dir.path());
        cache.save("plumbing", &sample_vendors()).unwrap();

        let inner = finder("[{\"name\": \"Fresh\"}]");
        let discovery = CachedDiscovery::new(cache.clone(), Some(inner), true);
        let vendors = discovery.find_vendors("plumbing", "Seattle").await.unwrap();
        assert_eq!(vendors, vec![Vendor::named("Fresh")]);
        assert_eq!(cache.load("plumbing").unwrap().unwrap(), vec![Vendor::named("Fresh")]);
    }

    #[tokio::test]
    async fn corrupt_cache_falls_back_to_inner() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VendorCache::new(dir.path());
        std::fs::write(cache.path_for("plumbing"), "[{").unwrap();

        let discovery = CachedDiscovery::new(cache, Some(finder("[{\"name\": \"Fresh\"}]")), false);
        let vendors = discovery.find_vendors("plumbing", "Seattle").await.unwrap();
        assert_eq!(vendors.len(), 1);
    }

    #[tokio::test]
    async fn cache_only_miss_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let discovery: CachedDiscovery<StaticDiscovery> =
            CachedDiscovery::new(VendorCache::new(dir.path()), None, false);
        assert!(discovery.find_vendors("roofing", "Seattle").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_generation_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VendorCache::new(dir.path());
        let discovery = CachedDiscovery::new(cache.clone(), Some(StaticDiscovery(vec![])), false);
        assert!(discovery.find_vendors("roofing", "Seattle").await.unwrap().is_empty());
        assert!(cache.load("roofing").unwrap().is_none());
    }
}
