#![no_main]
use libfuzzer_sys::fuzz_target;
use mmdb_lookup::Reader;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

fuzz_target!(|data: &[u8]| {
    // This should never crash or panic, even on garbage input
    let Ok(reader) = Reader::from_bytes(data.to_vec()) else {
        return;
    };

    let _ = reader.find_ip(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)));
    let _ = reader.find_ip(IpAddr::V4(Ipv4Addr::BROADCAST));
    let _ = reader.find_ip(IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)));
    let _ = reader.find_ip(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
    let _ = reader.find("not an address");

    // Walk the data section from its start too
    let start = reader.metadata().data_section_start();
    let _ = reader.decode_at(start);
});
