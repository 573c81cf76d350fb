use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

use voice_memo_bot::{
    audio::catalog::ClipCatalog,
    bot::{dispatcher::Dispatcher, registry::SessionRegistry, voice::SongbirdConnector, VoiceMemoBot},
    config::Config,
    upload::{FfmpegTranscoder, Uploader},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("voice_memo_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎙️ Iniciando Voice Memo Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    // Cargar clips del disco
    let catalog = Arc::new(ClipCatalog::new(
        config.clips_dir.clone(),
        config.clip_extension.clone(),
    ));
    let report = catalog.load_all().await?;
    if !report.failures.is_empty() {
        warn!("⚠️ {} archivos de clip no se pudieron cargar", report.failures.len());
    }

    let frame_duration = Duration::from_millis(config.frame_duration_ms);
    let total: Duration = catalog
        .list()
        .iter()
        .map(|clip| clip.duration(frame_duration))
        .sum();
    info!(
        "📚 {} clips cargados ({} de audio)",
        report.loaded,
        humantime::format_duration(total)
    );

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let songbird = Songbird::serenity();
    let registry = Arc::new(SessionRegistry::new(config.max_queue_size, config.pacing()));
    let uploader = Uploader::new(catalog.clone(), Arc::new(FfmpegTranscoder::new(&config)));
    let connector = Arc::new(SongbirdConnector::new(
        songbird.clone(),
        config.voice_frame_buffer,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        catalog,
        uploader,
        connector,
    ));

    // Crear handler del bot
    let config = Arc::new(config);
    let handler = VoiceMemoBot::new(config.clone(), dispatcher);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando {} sesiones...", registry.len());
        registry.shutdown().await;
        std::process::exit(0);
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let ffmpeg = async_process::Command::new(&config.ffmpeg_bin)
        .arg("-version")
        .output()
        .await?;

    // dca no tiene flag de versión; basta con que arranque
    let dca = async_process::Command::new(&config.dca_bin)
        .arg("-h")
        .output()
        .await;

    if ffmpeg.status.success() && dca.is_ok() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
