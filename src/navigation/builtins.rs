use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tokio::time::Instant;

use crate::config::types::DurationValue;
use crate::error::{ConfigError, NavigationError};
use crate::scenario::NavigationPlan;

use super::Navigation;
use super::context::{IterationContext, RequestSample, ThinkTime};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn invalid(plan: &NavigationPlan, option: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidNavigationOption {
        navigation: plan.name.clone(),
        option,
        message: message.into(),
    }
}

fn string_option(plan: &NavigationPlan, option: &'static str) -> Result<Option<String>, ConfigError> {
    match plan.options.get(option) {
        None => Ok(None),
        Some(toml::Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(invalid(plan, option, "expected a string")),
    }
}

fn duration_option(
    plan: &NavigationPlan,
    option: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = plan.options.get(option) else {
        return Ok(None);
    };
    let value: DurationValue = value
        .clone()
        .try_into()
        .map_err(|err: toml::de::Error| invalid(plan, option, err.to_string()))?;
    value
        .to_duration()
        .map(Some)
        .map_err(|err| invalid(plan, option, err.to_string()))
}

/// Issues one HTTP request per iteration and records it in `requests`.
///
/// Options: `url` (required), `method` (default GET), `body`,
/// `expected_status` (default: any 2xx), `timeout`, `fail_on_assertion`.
#[derive(Debug)]
pub struct HttpNavigation {
    client: Client,
    method: Method,
    url: String,
    body: Option<String>,
    expected_status: Option<u16>,
    fail_on_assertion: bool,
}

impl HttpNavigation {
    pub const KIND: &'static str = "http";

    /// # Errors
    ///
    /// Returns an error when an option is missing or malformed.
    pub fn from_plan(plan: &NavigationPlan) -> Result<Self, ConfigError> {
        let url = string_option(plan, "url")?.ok_or_else(|| invalid(plan, "url", "missing"))?;
        reqwest::Url::parse(&url).map_err(|err| invalid(plan, "url", err.to_string()))?;
        let method = match string_option(plan, "method")? {
            Some(method) => Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|err| invalid(plan, "method", err.to_string()))?,
            None => Method::GET,
        };
        let expected_status = match plan.options.get("expected_status") {
            None => None,
            Some(toml::Value::Integer(code)) => Some(
                u16::try_from(*code)
                    .map_err(|err| invalid(plan, "expected_status", err.to_string()))?,
            ),
            Some(_) => return Err(invalid(plan, "expected_status", "expected an integer")),
        };
        let fail_on_assertion = match plan.options.get("fail_on_assertion") {
            None => false,
            Some(toml::Value::Boolean(flag)) => *flag,
            Some(_) => return Err(invalid(plan, "fail_on_assertion", "expected a boolean")),
        };
        let timeout = duration_option(plan, "timeout")?.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| invalid(plan, "timeout", err.to_string()))?;
        Ok(Self {
            client,
            method,
            url,
            body: string_option(plan, "body")?,
            expected_status,
            fail_on_assertion,
        })
    }

    fn request_name(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

#[async_trait]
impl Navigation for HttpNavigation {
    async fn steps(&mut self, ctx: &mut IterationContext) -> Result<(), NavigationError> {
        let mut request = self.client.request(self.method.clone(), &self.url);
        if let Some(body) = self.body.as_ref() {
            request = request.body(body.clone());
        }
        let specs = serde_json::json!({
            "method": self.method.as_str(),
            "url": self.url,
            "body_bytes": self.body.as_ref().map_or(0, String::len),
        })
        .to_string();

        let started = Instant::now();
        let outcome = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, bytes.len()))
        }
        .await;
        let elapsed = started.elapsed();

        match outcome {
            Ok((status, size)) => {
                let passed = self.expected_status.map_or_else(
                    || (200..300).contains(&status),
                    |expected| expected == status,
                );
                ctx.record_request(RequestSample {
                    request_name: self.request_name(),
                    request_type: "http".to_owned(),
                    request_specs: specs,
                    duration: elapsed,
                    status: Some(status),
                    response_size: u64::try_from(size).unwrap_or(u64::MAX),
                    assertion_result: passed,
                })
                .await;
                if !passed && self.fail_on_assertion {
                    return Err(NavigationError::UnexpectedStatus {
                        name: self.request_name(),
                        expected: self.expected_status.unwrap_or(200),
                        actual: status,
                    });
                }
                Ok(())
            }
            Err(err) => {
                ctx.record_request(RequestSample {
                    request_name: self.request_name(),
                    request_type: "http".to_owned(),
                    request_specs: specs,
                    duration: elapsed,
                    status: None,
                    response_size: 0,
                    assertion_result: false,
                })
                .await;
                Err(NavigationError::Request {
                    name: self.request_name(),
                    source: err,
                })
            }
        }
    }
}

/// Sleeps every iteration; handy for soak profiles and dry runs.
///
/// Options: `think_time` (default 1s) and an optional `think_time_max` that
/// turns it into a uniform draw.
#[derive(Debug, Clone, Copy)]
pub struct ThinkNavigation {
    think: ThinkTime,
}

impl ThinkNavigation {
    pub const KIND: &'static str = "think";

    /// # Errors
    ///
    /// Returns an error when a duration option is malformed.
    pub fn from_plan(plan: &NavigationPlan) -> Result<Self, ConfigError> {
        let min = duration_option(plan, "think_time")?.unwrap_or(Duration::from_secs(1));
        let think = match duration_option(plan, "think_time_max")? {
            Some(max) if max < min => {
                return Err(invalid(plan, "think_time_max", "must be >= think_time"));
            }
            Some(max) => ThinkTime::Uniform { min, max },
            None => ThinkTime::Fixed(min),
        };
        Ok(Self { think })
    }

    #[must_use]
    pub const fn think(&self) -> ThinkTime {
        self.think
    }
}

#[async_trait]
impl Navigation for ThinkNavigation {
    async fn steps(&mut self, ctx: &mut IterationContext) -> Result<(), NavigationError> {
        ctx.think_time(self.think).await;
        Ok(())
    }
}
