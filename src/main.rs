use std::sync::Arc;

use log::{error, info};
use qdown::api::{fetch_app_secrets, secrets::PLAYER_BASE_URL};
use qdown::cli::{self, RunRequest};
use qdown::config::Config;
use qdown::core::{DownloadError, DownloadManager, ReqwestTransport, RetryStrategy, RetryingTransport, Transport};
use qdown::tagging::{checksum, FlacTagger};
use qdown::ui;
use qdown::utils::logger;

#[tokio::main]
async fn main() {
    // 解析参数和配置
    let (args, config) = match cli::Args::parse_args() {
        Ok((args, config)) => (args, config),
        Err(e) => {
            eprintln!("参数解析失败: {}", e);
            std::process::exit(1);
        }
    };

    let log_file = (!config.log_file.trim().is_empty()).then_some(config.log_file.as_str());
    if let Err(e) = logger::init(log_file, &config.log_level) {
        eprintln!("日志初始化失败: {}", e);
    }
    info!("程序启动");
    info!("配置文件路径: {}", args.config);

    let code = match run(&args, &config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ui::print_error(&e.to_string());
            1
        }
    };
    log::Log::flush(log::logger());
    std::process::exit(code);
}

fn build_transport(config: &Config) -> Result<Arc<dyn Transport>, DownloadError> {
    let transport = ReqwestTransport::new(config)?;
    Ok(Arc::new(RetryingTransport::new(transport, RetryStrategy::from_config(config))))
}

async fn run(args: &cli::Args, config: &Config) -> Result<i32, DownloadError> {
    if args.extract_secrets {
        let transport = build_transport(config)?;
        for secret in fetch_app_secrets(transport.as_ref(), PLAYER_BASE_URL).await? {
            println!("{}: {}", secret.timezone, secret.secret);
        }
        return Ok(0);
    }

    if let Some(dir) = &args.fix_md5 {
        let results = checksum::repair_directory(dir).await?;
        let failed = results.iter().filter(|(_, result)| result.is_err()).count();
        println!("共 {} 个文件，失败 {} 个", results.len(), failed);
        return Ok(if failed > 0 { 1 } else { 0 });
    }

    let request = args.resolve_request(config)?;
    config.require_credentials()?;
    info!("{}", config.get_summary());

    let transport = build_transport(config)?;
    let mut manager = DownloadManager::new(config, transport, Box::new(FlacTagger))?.with_progress(true);

    if args.list {
        let album_id = match &request {
            RunRequest::Albums(ids) => ids.first().cloned().unwrap_or_default(),
            RunRequest::Tracks { album_id, .. } => album_id.clone(),
        };
        let album = manager.list_album(&album_id).await?;
        ui::print_tracklist(&album);
        return Ok(0);
    }

    match &request {
        RunRequest::Albums(album_ids) => manager.download_albums(album_ids).await?,
        RunRequest::Tracks { album_id, numbers } => manager.download_tracks(album_id, numbers).await?,
    }

    let summary = manager.summary();
    println!("{}", summary);
    if summary.has_failures() {
        return Ok(1);
    }
    ui::print_success("全部下载完成");
    Ok(0)
}
