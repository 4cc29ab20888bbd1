#![no_main]
use libfuzzer_sys::fuzz_target;
use socks5_tunnel::socks5::{AuthMethod, ReplyParser};

fuzz_target!(|data: &[u8]| {
    let Some((&first, reply)) = data.split_first() else {
        return;
    };
    let offered = if first & 1 == 0 {
        AuthMethod::NoAuth
    } else {
        AuthMethod::UsernamePassword
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    rt.block_on(async {
        let mut reader = reply;
        let parser = ReplyParser::new(&mut reader, offered);
        if let Ok(addr) = parser.parse().await {
            // A successful parse consumes a fixed-size prefix and nothing more.
            let consumed = reply.len() - reader.len();
            assert!(consumed == 12 || consumed == 24 || consumed == 14 || consumed == 26);
            assert!(addr.as_socket_addr().is_some());
        }
    });
});
