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

use prometheus::core::{AtomicF64, GenericCounter, GenericGauge};
use prometheus::{register_counter, register_gauge, Encoder, TextEncoder};

/// A struct definition for collecting metrics in the relayer.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// How many full resync cycles completed.
    pub resync_cycles_completed: GenericCounter<AtomicF64>,
    /// How many projects were upserted into the mirror by resync cycles.
    pub projects_resynced: GenericCounter<AtomicF64>,
    /// How many ledger events were handled by the event relay.
    pub events_handled: GenericCounter<AtomicF64>,
    /// How many ledger events were skipped as malformed.
    pub events_skipped: GenericCounter<AtomicF64>,
    /// How many notifications were recorded by the sink.
    pub notifications_recorded: GenericCounter<AtomicF64>,
    /// How many times the event watcher backed off and reconnected.
    pub event_watcher_back_off: GenericCounter<AtomicF64>,
    /// Total amount of data stored in the mirror database.
    pub total_amount_of_data_stored: GenericGauge<AtomicF64>,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, and registers
    /// them with the default registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let resync_cycles_completed = register_counter!(
            "resync_cycles_completed",
            "The total number of full resync cycles completed",
        )?;

        let projects_resynced = register_counter!(
            "projects_resynced",
            "The total number of projects upserted by resync cycles",
        )?;

        let events_handled = register_counter!(
            "events_handled",
            "The total number of ledger events handled by the relay",
        )?;

        let events_skipped = register_counter!(
            "events_skipped",
            "The total number of malformed ledger events skipped",
        )?;

        let notifications_recorded = register_counter!(
            "notifications_recorded",
            "The total number of notifications recorded by the sink",
        )?;

        let event_watcher_back_off = register_counter!(
            "event_watcher_back_off",
            "specifies how many times the event watcher backed off",
        )?;

        let total_amount_of_data_stored = register_gauge!(
            "total_amount_of_data_stored",
            "The total amount of data stored in the mirror database",
        )?;

        Ok(Self {
            resync_cycles_completed,
            projects_resynced,
            events_handled,
            events_skipped,
            notifications_recorded,
            event_watcher_back_off,
            total_amount_of_data_stored,
        })
    }

    /// Gathers the whole relayer metrics, encoded in the Prometheus text
    /// format.
    pub fn gather_metrics() -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        encoder.encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
