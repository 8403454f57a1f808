#![no_main]
use libfuzzer_sys::fuzz_target;
use mmdb_lookup::data_section::Decoder;
use mmdb_lookup::Buffer;

fuzz_target!(|data: &[u8]| {
    let Ok(buffer) = Buffer::from_bytes(data.to_vec()) else {
        return;
    };
    // First byte picks the pointer base, the rest is decoded from every offset
    let base = data[0] as u64 % buffer.len();
    let decoder = Decoder::new(&buffer, base);
    for offset in 0..buffer.len() {
        let _ = decoder.decode(offset);
        let _ = decoder.skip(offset);
    }
});
