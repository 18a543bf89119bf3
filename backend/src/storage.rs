use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use tracing::{instrument, warn};
use url::Url;

use crate::{
    config::BlobConfig,
    error::{Error, Result},
};

type HmacSha256 = Hmac<Sha256>;

const SAS_VERSION: &str = "2022-11-02";
const SAS_LIFETIME_MINUTES: i64 = 60;
/// Tolerated clock difference between this host and the storage service.
const CLOCK_SKEW_MINUTES: i64 = 5;

/// Read access to one blob container through short-lived service SAS urls.
#[derive(Clone)]
pub struct StorageClient {
    account: String,
    key: Vec<u8>,
    container: String,
    endpoint: Url,
    client: Client,
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("account", &self.account)
            .field("container", &self.container)
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl StorageClient {
    pub fn new(config: &BlobConfig, client: Client) -> Result<Self> {
        let key = BASE64
            .decode(config.key.trim())
            .map_err(|e| Error::Signing(format!("account key is not base64: {e}")))?;
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| Error::Signing(format!("invalid blob endpoint: {e}")))?;
        Ok(Self {
            account: config.account.clone(),
            key,
            container: config.container.clone(),
            endpoint,
            client,
        })
    }

    /// Mints a read-only url for `blob`, valid for one hour from `now`.
    pub fn signed_url(&self, blob: &str, now: DateTime<Utc>) -> Result<String> {
        let st = (now - Duration::minutes(CLOCK_SKEW_MINUTES))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let se = (now + Duration::minutes(SAS_LIFETIME_MINUTES))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let resource = format!("/blob/{}/{}/{}", self.account, self.container, blob);
        // permissions, start, expiry, resource, identifier, ip, protocol, version,
        // resource type, snapshot, encryption scope, then the five response headers
        let string_to_sign = [
            "r",
            st.as_str(),
            se.as_str(),
            resource.as_str(),
            "",
            "",
            "",
            SAS_VERSION,
            "b",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
        ]
        .join("\n");

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::Signing(format!("HMAC initialization failed: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let sig = BASE64.encode(mac.finalize().into_bytes());

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Signing("blob endpoint cannot be a base url".into()))?
            .pop_if_empty()
            .push(&self.container)
            .push(blob);
        url.query_pairs_mut()
            .append_pair("sv", SAS_VERSION)
            .append_pair("st", &st)
            .append_pair("se", &se)
            .append_pair("sr", "b")
            .append_pair("sp", "r")
            .append_pair("sig", &sig);

        Ok(url.into())
    }

    /// HEAD probe; anything but a 2xx counts as unreachable.
    #[instrument(skip_all)]
    pub async fn is_reachable(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "blob probe rejected");
                false
            }
            Err(e) => {
                warn!("blob probe failed: {e}");
                false
            }
        }
    }
}
