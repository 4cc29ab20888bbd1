#![no_main]
use libfuzzer_sys::fuzz_target;
use socks5_tunnel::socks5::{build_request_frame, Address, Credentials, TunnelCommand};

// Input layout: [cmd, ulen, plen, user.., pass.., host..]
fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let command = match data[0] % 3 {
        0 => TunnelCommand::Connect,
        1 => TunnelCommand::UdpAssociate,
        _ => TunnelCommand::ForwardUdp,
    };
    let rest = &data[3..];
    let ulen = (data[1] as usize).min(rest.len());
    let (user, rest) = rest.split_at(ulen);
    let plen = (data[2] as usize).min(rest.len());
    let (pass, host) = rest.split_at(plen);

    let credentials = Credentials::new(user, pass).ok();
    let target = Address::domain(String::from_utf8_lossy(host).into_owned(), 443);

    match build_request_frame(credentials.as_ref(), command, &target) {
        Ok(frame) => {
            assert_eq!(frame.as_bytes()[0], 0x05);
            assert!(frame.as_bytes().ends_with(frame.request()));
            assert_eq!(frame.request()[1], command.as_u8());
        }
        Err(_) => assert!(target.encoded_len() > 1 + 1 + 255 + 2),
    }
});
