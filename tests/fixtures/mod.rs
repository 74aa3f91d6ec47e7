//! Shared fixtures for the data-path integration tests.
#![allow(dead_code)]

pub mod driver {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use shearwater::driver::{Conductor, CounterReader, DriverError};
    use shearwater::Image;

    /// In-process stand-in for the conductor/driver boundary: a counter
    /// map plus a release log.
    #[derive(Default)]
    pub struct StubConductor {
        counters: Mutex<HashMap<i32, i64>>,
        pub releases: AtomicUsize,
        pub lingered: Mutex<Vec<Arc<Image>>>,
    }

    impl StubConductor {
        pub fn set_counter(&self, counter_id: i32, value: i64) {
            self.counters.lock().expect("counters").insert(counter_id, value);
        }
    }

    impl CounterReader for StubConductor {
        fn counter_value(&self, counter_id: i32) -> i64 {
            self.counters
                .lock()
                .expect("counters")
                .get(&counter_id)
                .copied()
                .unwrap_or(0)
        }

        fn scan_for_type(&self, _type_id: i32, _each: &mut dyn FnMut(i32, &[u8])) {}
    }

    impl Conductor for StubConductor {
        fn release_subscription(
            &self,
            _registration_id: i64,
            images: Vec<Arc<Image>>,
        ) -> Result<(), DriverError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.lingered.lock().expect("lingered").extend(images);
            Ok(())
        }
    }
}

pub mod log {
    use std::sync::Arc;

    use shearwater::cluster::codecs::encode::EventWriter;
    use shearwater::cluster::codecs::{
        CLUSTER_SCHEMA_VERSION, SESSION_MESSAGE_HEADER_TEMPLATE_ID,
    };
    use shearwater::StreamRegion;

    pub const LOG_SESSION_ID: i32 = 1;
    pub const LOG_STREAM_ID: i32 = 200;

    pub fn seed_log(events: &[Vec<u8>]) -> Arc<StreamRegion> {
        let region = Arc::new(StreamRegion::new(16 * 1024));
        for event in events {
            region
                .append_data(LOG_SESSION_ID, LOG_STREAM_ID, event)
                .expect("log region has room");
        }
        region
    }

    pub fn session_message(cluster_session_id: i64, timestamp: i64, payload: &[u8]) -> Vec<u8> {
        EventWriter::new(SESSION_MESSAGE_HEADER_TEMPLATE_ID, 24, CLUSTER_SCHEMA_VERSION)
            .i64(5)
            .i64(cluster_session_id)
            .i64(timestamp)
            .raw(payload)
            .finish()
    }
}
