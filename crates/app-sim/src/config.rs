//! Configuration types for the simulator.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Origin the page fetches its data from
    pub base_url: String,
    /// Backend response latency
    pub api_latency_ms: u64,
    /// Delay between `visit` and the page being rendered
    pub render_delay_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_latency_ms: 25,
            render_delay_ms: 10,
        }
    }
}

impl SimConfig {
    pub fn messages_url(&self) -> String {
        format!("{}/posts/1/messages", self.base_url.trim_end_matches('/'))
    }
}
