use tracing::info;

pub(super) async fn cmd_start(
    mut config: relay_config::RelayConfig,
    listen: Option<String>,
) -> relay_core::Result<()> {
    if let Some(listen) = listen {
        config.server.listen = listen;
    }

    println!("Relay v{}", env!("CARGO_PKG_VERSION"));
    println!("   Listen: {}", config.server.listen);
    println!("   System id: {}", config.bridge.system_id);
    println!("   Tick: {}ms", config.dispatch.tick_interval_ms);
    match config.bridge.request_timeout_secs {
        0 => println!("   Request timeout: disabled"),
        secs => println!("   Request timeout: {secs}s"),
    }
    println!();

    relay_server::start_server(config).await?;
    info!("relay stopped");
    Ok(())
}
