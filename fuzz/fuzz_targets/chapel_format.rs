#![no_main]

use huskycat::chapel;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(code) = std::str::from_utf8(data) {
        let once = chapel::format(code);
        let twice = chapel::format(&once);
        assert_eq!(once, twice, "formatting must be idempotent");
    }
});
