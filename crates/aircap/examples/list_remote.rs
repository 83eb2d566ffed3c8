//! List the capturable interfaces of a remote capture peer.
//!
//! Usage: `cargo run --example list_remote -- sensor.local:3501`

use aircap::{SourceBuilder, TcpTransport};
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> aircap::Result<()> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:3501".to_string());

    let source = SourceBuilder::new("wifi").list_capable(true).build();
    let transport = TcpTransport::connect(&addr).await?;
    source.connect_buffer(transport);

    let (tx, rx) = oneshot::channel();
    source.list_interfaces(
        1,
        Box::new(move |_, interfaces| {
            let _ = tx.send(interfaces);
        }),
    );

    let interfaces = rx.await.unwrap_or_default();
    if interfaces.is_empty() {
        println!("no capturable interfaces reported");
    } else {
        for iface in interfaces {
            match iface.flags {
                Some(flags) => println!("{} ({flags})", iface.interface),
                None => println!("{}", iface.interface),
            }
        }
    }
    Ok(())
}
