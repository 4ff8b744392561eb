// Copyright 2024 TFAS Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};

/// An RPC URL wrapper around [`url::Url`] to support `serde`
/// deserialization from environment variables.
///
/// A value starting with `$` is resolved as the name of an environment
/// variable holding the actual URL, e.g. `$TFAS_LEDGER_URL`.
#[derive(Clone, Serialize)]
pub struct RpcUrl(url::Url);

impl RpcUrl {
    /// Returns the inner [`url::Url`].
    pub fn as_url(&self) -> &url::Url {
        &self.0
    }
}

impl std::fmt::Display for RpcUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Debug for RpcUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl From<RpcUrl> for url::Url {
    fn from(rpc_url: RpcUrl) -> Self {
        rpc_url.0
    }
}

impl From<url::Url> for RpcUrl {
    fn from(url: url::Url) -> Self {
        RpcUrl(url)
    }
}

impl std::ops::Deref for RpcUrl {
    type Target = url::Url;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RpcUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let value = if let Some(var) = raw.strip_prefix('$') {
            std::env::var(var).map_err(|_| {
                serde::de::Error::custom(format!(
                    "environment variable {var} is not set"
                ))
            })?
        } else {
            raw
        };
        let url = value.parse::<url::Url>().map_err(|e| {
            serde::de::Error::custom(format!("invalid rpc url: {e}"))
        })?;
        Ok(RpcUrl(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_url() {
        let url: RpcUrl =
            serde_json::from_str(r#""http://127.0.0.1:7545""#).unwrap();
        assert_eq!(url.as_url().as_str(), "http://127.0.0.1:7545/");
    }

    #[test]
    fn resolves_environment_variables() {
        std::env::set_var("TFAS_TEST_LEDGER_URL", "http://localhost:8545");
        let url: RpcUrl =
            serde_json::from_str(r#""$TFAS_TEST_LEDGER_URL""#).unwrap();
        assert_eq!(url.as_url().as_str(), "http://localhost:8545/");
    }
}
