use crate::error::{CloudProviderError, Result};
use crate::{CloudMetricsProvider, Datapoint, DiscoveredResource, StatisticsQuery};
use chrono::{DateTime, Utc};
use cwmon_common::types::ResourceKind;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
const ISO8601: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A Query-protocol AWS service: signing name, endpoint prefix and API version.
#[derive(Debug, Clone, Copy)]
struct Service {
    signing_name: &'static str,
    version: &'static str,
}

const ELB: Service = Service {
    signing_name: "elasticloadbalancing",
    version: "2012-06-01",
};
const RDS: Service = Service {
    signing_name: "rds",
    version: "2014-10-31",
};
const CLOUDWATCH: Service = Service {
    signing_name: "monitoring",
    version: "2010-08-01",
};

/// Credentials and region for the AWS provider.
#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: String,
    pub request_timeout_secs: u64,
}

/// [`CloudMetricsProvider`] backed by ELB, RDS and CloudWatch Query APIs.
pub struct AwsProvider {
    name: String,
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    region: String,
    client: Client,
}

impl AwsProvider {
    pub fn new(config: AwsConfig) -> Result<Self> {
        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(CloudProviderError::ConfigError(
                "AWS access key id and secret access key are required".to_string(),
            ));
        }
        if config.region.is_empty() {
            return Err(CloudProviderError::ConfigError("AWS region is required".to_string()));
        }

        let client = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            name: format!("aws:{}", config.region),
            access_key_id: config.access_key_id,
            secret_access_key: config.secret_access_key,
            session_token: config.session_token.filter(|t| !t.is_empty()),
            region: config.region,
            client,
        })
    }

    fn host(&self, service: &Service) -> String {
        format!("{}.{}.amazonaws.com", service.signing_name, self.region)
    }

    /// AWS Signature Version 4 for a form-encoded POST to `/`.
    ///
    /// Returns the `Authorization` header value.
    fn sign_v4(
        &self,
        service: &str,
        host: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        // Step 1: canonical request, headers sorted by name
        let mut canonical_headers = format!(
            "content-type:{}\nhost:{}\nx-amz-date:{}\n",
            CONTENT_TYPE, host, amz_date
        );
        let mut signed_headers = String::from("content-type;host;x-amz-date");
        if let Some(token) = &self.session_token {
            canonical_headers.push_str(&format!("x-amz-security-token:{}\n", token));
            signed_headers.push_str(";x-amz-security-token");
        }

        let hashed_payload = format!("{:x}", Sha256::digest(payload.as_bytes()));
        let canonical_request = format!(
            "POST\n/\n\n{}\n{}\n{}",
            canonical_headers, signed_headers, hashed_payload
        );
        let hashed_canonical_request =
            format!("{:x}", Sha256::digest(canonical_request.as_bytes()));

        // Step 2: string to sign
        let credential_scope = format!("{}/{}/{}/aws4_request", date, self.region, service);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date, credential_scope, hashed_canonical_request
        );

        // Step 3: signature
        let signing_key = signing_key(&self.secret_access_key, &date, &self.region, service)?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        Ok(format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key_id, credential_scope, signed_headers, signature
        ))
    }

    /// Call a Query API action and return the raw XML body of a successful response.
    async fn call_api(
        &self,
        service: &Service,
        action: &str,
        mut params: BTreeMap<String, String>,
    ) -> Result<String> {
        params.insert("Action".to_string(), action.to_string());
        params.insert("Version".to_string(), service.version.to_string());
        let payload = encode_form(&params);

        let host = self.host(service);
        let now = Utc::now();
        let authorization = self.sign_v4(service.signing_name, &host, &payload, now)?;

        tracing::debug!(service = service.signing_name, action, payload = %payload, "AWS request");

        let mut request = self
            .client
            .post(format!("https://{}/", host))
            .header("Content-Type", CONTENT_TYPE)
            .header("Host", &host)
            .header("X-Amz-Date", now.format("%Y%m%dT%H%M%SZ").to_string())
            .header("Authorization", authorization);
        if let Some(token) = &self.session_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        let response = request.body(payload).send().await?;
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(
            service = service.signing_name,
            action,
            status = status.as_u16(),
            body = %body,
            "AWS response"
        );

        if !status.is_success() {
            return Err(parse_error_response(service.signing_name, status.as_u16(), &body));
        }

        Ok(body)
    }

    async fn list_load_balancers(&self) -> Result<Vec<DiscoveredResource>> {
        let mut all = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut params = BTreeMap::new();
            if let Some(m) = &marker {
                params.insert("Marker".to_string(), m.clone());
            }
            let body = self.call_api(&ELB, "DescribeLoadBalancers", params).await?;
            let (page, next) = parse_load_balancers(&body)?;
            all.extend(page);

            match next {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        Ok(all)
    }

    async fn list_db_instances(&self) -> Result<Vec<DiscoveredResource>> {
        let mut all = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut params = BTreeMap::new();
            if let Some(m) = &marker {
                params.insert("Marker".to_string(), m.clone());
            }
            let body = self.call_api(&RDS, "DescribeDBInstances", params).await?;
            let (page, next) = parse_db_instances(&body)?;
            all.extend(page);

            match next {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        Ok(all)
    }
}

#[async_trait::async_trait]
impl CloudMetricsProvider for AwsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<DiscoveredResource>> {
        match kind {
            ResourceKind::LoadBalancer => self.list_load_balancers().await,
            ResourceKind::ManagedDatabase => self.list_db_instances().await,
        }
    }

    async fn query_statistics(&self, query: &StatisticsQuery) -> Result<Vec<Datapoint>> {
        let body = self
            .call_api(&CLOUDWATCH, "GetMetricStatistics", statistics_params(query))
            .await?;
        parse_datapoints(&body)
    }
}

fn statistics_params(query: &StatisticsQuery) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("Namespace".to_string(), query.namespace.clone());
    params.insert("MetricName".to_string(), query.metric_name.clone());
    params.insert("Dimensions.member.1.Name".to_string(), query.dimension.name.clone());
    params.insert("Dimensions.member.1.Value".to_string(), query.dimension.value.clone());
    params.insert("StartTime".to_string(), query.start_time.format(ISO8601).to_string());
    params.insert("EndTime".to_string(), query.end_time.format(ISO8601).to_string());
    params.insert("Period".to_string(), query.period_secs.to_string());
    params.insert("Statistics.member.1".to_string(), query.statistic.as_str().to_string());
    params
}

fn encode_form(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Map a non-2xx response to an error, preferring the service's own error document.
fn parse_error_response(service: &str, status: u16, body: &str) -> CloudProviderError {
    match quick_xml::de::from_str::<xml::ErrorResponse>(body) {
        Ok(doc) => {
            let code = doc.error.code;
            let message = doc.error.message.unwrap_or_default();
            if matches!(
                code.as_str(),
                "Throttling" | "ThrottlingException" | "RequestLimitExceeded"
            ) {
                CloudProviderError::RateLimited {
                    service: service.to_string(),
                    message,
                }
            } else {
                CloudProviderError::ApiResponseError {
                    service: service.to_string(),
                    code,
                    message,
                }
            }
        }
        Err(_) => CloudProviderError::HttpError {
            service: service.to_string(),
            status,
            body: body.to_string(),
        },
    }
}

fn non_empty(marker: Option<String>) -> Option<String> {
    marker.filter(|m| !m.is_empty())
}

fn parse_load_balancers(body: &str) -> Result<(Vec<DiscoveredResource>, Option<String>)> {
    let doc: xml::DescribeLoadBalancersResponse = quick_xml::de::from_str(body)?;
    let result = doc.result;
    let resources = result
        .descriptions
        .member
        .into_iter()
        .map(|lb| DiscoveredResource {
            name: lb.name,
            address: lb.dns_name,
        })
        .collect();
    Ok((resources, non_empty(result.next_marker)))
}

fn parse_db_instances(body: &str) -> Result<(Vec<DiscoveredResource>, Option<String>)> {
    let doc: xml::DescribeDbInstancesResponse = quick_xml::de::from_str(body)?;
    let result = doc.result;
    let resources = result
        .instances
        .instance
        .into_iter()
        .filter_map(|db| match db.endpoint.and_then(|e| e.address) {
            Some(address) => Some(DiscoveredResource {
                name: db.identifier,
                address,
            }),
            None => {
                tracing::debug!(instance = %db.identifier, "DB instance has no endpoint yet, skipping");
                None
            }
        })
        .collect();
    Ok((resources, non_empty(result.marker)))
}

fn parse_datapoints(body: &str) -> Result<Vec<Datapoint>> {
    let doc: xml::GetMetricStatisticsResponse = quick_xml::de::from_str(body)?;
    Ok(doc
        .result
        .datapoints
        .member
        .into_iter()
        .map(|dp| Datapoint {
            timestamp: dp.timestamp.timestamp(),
            sum: dp.sum,
            average: dp.average,
        })
        .collect())
}

/// Derive the SigV4 signing key for one day, region and service.
fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// HMAC-SHA256 helper function
fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CloudProviderError::HmacError(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Response documents of the Query APIs, reduced to the fields we read.
mod xml {
    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Members<T> {
        #[serde(default = "Vec::new")]
        pub member: Vec<T>,
    }

    impl<T> Default for Members<T> {
        fn default() -> Self {
            Self { member: Vec::new() }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct ErrorResponse {
        #[serde(rename = "Error")]
        pub error: ErrorDetail,
    }

    #[derive(Debug, Deserialize)]
    pub struct ErrorDetail {
        #[serde(rename = "Code")]
        pub code: String,
        #[serde(rename = "Message")]
        pub message: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct DescribeLoadBalancersResponse {
        #[serde(rename = "DescribeLoadBalancersResult")]
        pub result: DescribeLoadBalancersResult,
    }

    #[derive(Debug, Deserialize)]
    pub struct DescribeLoadBalancersResult {
        #[serde(rename = "LoadBalancerDescriptions", default)]
        pub descriptions: Members<LoadBalancerDescription>,
        #[serde(rename = "NextMarker")]
        pub next_marker: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct LoadBalancerDescription {
        #[serde(rename = "LoadBalancerName")]
        pub name: String,
        #[serde(rename = "DNSName")]
        pub dns_name: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct DescribeDbInstancesResponse {
        #[serde(rename = "DescribeDBInstancesResult")]
        pub result: DescribeDbInstancesResult,
    }

    #[derive(Debug, Deserialize)]
    pub struct DescribeDbInstancesResult {
        #[serde(rename = "DBInstances", default)]
        pub instances: DbInstances,
        #[serde(rename = "Marker")]
        pub marker: Option<String>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct DbInstances {
        #[serde(rename = "DBInstance", default = "Vec::new")]
        pub instance: Vec<DbInstance>,
    }

    #[derive(Debug, Deserialize)]
    pub struct DbInstance {
        #[serde(rename = "DBInstanceIdentifier")]
        pub identifier: String,
        #[serde(rename = "Endpoint")]
        pub endpoint: Option<Endpoint>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Endpoint {
        #[serde(rename = "Address")]
        pub address: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct GetMetricStatisticsResponse {
        #[serde(rename = "GetMetricStatisticsResult")]
        pub result: GetMetricStatisticsResult,
    }

    #[derive(Debug, Deserialize)]
    pub struct GetMetricStatisticsResult {
        #[serde(rename = "Datapoints", default)]
        pub datapoints: Members<XmlDatapoint>,
    }

    #[derive(Debug, Deserialize)]
    pub struct XmlDatapoint {
        #[serde(rename = "Timestamp")]
        pub timestamp: DateTime<Utc>,
        #[serde(rename = "Sum")]
        pub sum: Option<f64>,
        #[serde(rename = "Average")]
        pub average: Option<f64>,
    }
}
