#![no_main]

use huskycat::types::{PidRecord, ValidationRun};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Try to parse as JSON and verify serialization roundtrips
    if let Ok(json_str) = std::str::from_utf8(data) {
        if let Ok(run) = serde_json::from_str::<ValidationRun>(json_str) {
            if let Ok(roundtripped) = serde_json::to_string(&run) {
                if let Ok(parsed) = serde_json::from_str::<ValidationRun>(&roundtripped) {
                    assert_eq!(run, parsed);
                }
            }
        }

        if let Ok(record) = serde_json::from_str::<PidRecord>(json_str) {
            if let Ok(roundtripped) = serde_json::to_string(&record) {
                if let Ok(parsed) = serde_json::from_str::<PidRecord>(&roundtripped) {
                    assert_eq!(record, parsed);
                }
            }
        }
    }
});
