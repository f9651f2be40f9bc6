#![no_main]

use std::fs;

use huskycat::runstore::RunStore;
use libfuzzer_sys::fuzz_target;
use tempfile::tempdir;

fuzz_target!(|data: &[u8]| {
    let td = match tempdir() {
        Ok(v) => v,
        Err(_) => return,
    };

    let store = RunStore::new(td.path().to_path_buf());
    if fs::write(store.last_run_path(), data).is_ok() {
        let _ = store.last_run();
    }
});
