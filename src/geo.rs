// src/geo.rs

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::error::AppResult;

#[derive(Debug, Default, Deserialize)]
pub struct GeoInfo {
    pub city:         Option<String>,
    pub country_name: Option<String>,
    pub country_code: Option<String>,
}

impl GeoInfo {
    /// "City, Country" or None when the service knows no city.
    pub fn label(&self) -> Option<String> {
        let city = self.city.as_deref().filter(|c| !c.is_empty())?;
        let country = self
            .country_name
            .as_deref()
            .or(self.country_code.as_deref())
            .unwrap_or_default();
        Some(format!("{city}, {country}"))
    }
}

/// Cosmetic location lookup by public IP.
#[derive(Clone)]
pub struct GeoLookup {
    http:     Client,
    base_url: String,
    fallback: String,
}

impl GeoLookup {
    pub fn new(base_url: &str, fallback: &str) -> AppResult<Self> {
        let http = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').into(), fallback: fallback.into() })
    }

    async fn fetch(&self, ip: &str) -> AppResult<GeoInfo> {
        let url = format!("{}/{ip}/json/", self.base_url);
        Ok(self.http.get(&url).send().await?.error_for_status()?.json().await?)
    }

    /// Never fails: any error or unknown city gives the fallback string.
    /// Without a public address nothing is looked up; the service would
    /// otherwise answer for the server's own address.
    pub async fn locate(&self, ip: Option<&str>) -> String {
        let Some(ip) = ip else {
            return self.fallback.clone();
        };
        match self.fetch(ip).await {
            Ok(info) => info.label().unwrap_or_else(|| self.fallback.clone()),
            Err(e) => {
                tracing::warn!(error = %e, "geo lookup failed");
                self.fallback.clone()
            }
        }
    }
}
