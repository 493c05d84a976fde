use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use chillroom_core_sdk::prelude::*;

/**
 * \brief CLI 程序入口：启动代理服务或在终端里直接调用两个接口。
 */
#[derive(Parser, Debug)]
#[command(name = "chillroom", version, about = "Chillroom chat & video proxy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 启动 HTTP 服务，提供 /api/chat、/api/video 与前端页面。
     */
    Serve {
        /** \brief 监听地址，缺省使用 CHILLROOM_HOST 与 PORT */
        #[arg(long)]
        addr: Option<String>,
    },

    /**
     * \brief 发送一条消息并打印模型回复。
     */
    Chat {
        #[arg(long)]
        message: String,
        /** \brief 打印上游原始 JSON */
        #[arg(long, default_value_t = false)]
        raw: bool,
    },

    /**
     * \brief 签发视频地址并打印。
     */
    Video {
        #[arg(long)]
        file: Option<String>,
    },

    /**
     * \brief 校验配置并打印解析结果（不含密钥）。
     */
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing();

    let config = config::AppConfig::from_env().context("load configuration failed")?;
    telemetry::set_enabled(config.server.telemetry_enabled);

    match cli.command {
        Commands::Serve { addr } => {
            server::run(config, addr.as_deref()).await?;
        }
        Commands::Chat { message, raw } => {
            let upstream =
                llm::build_upstream(&config.upstream).context("build chat upstream failed")?;
            let payload = serde_json::json!({ "message": message.as_str() });
            let completion = chat::handle_chat(upstream.as_ref(), &config.upstream, &payload)
                .await
                .context("chat request failed")?;

            telemetry::log_event(
                "cli.chat",
                &format!(
                    "provider={} model={} prompt_len={}",
                    upstream.kind(),
                    upstream.model(),
                    message.len()
                ),
            );

            match (raw, completion.reply) {
                (false, Some(reply)) => println!("{}", reply.text),
                _ => println!("{}", serde_json::to_string_pretty(&completion.raw)?),
            }
        }
        Commands::Video { file } => {
            let backend = storage::build_storage(&config.storage).context("build storage failed")?;
            let request = models::VideoLinkRequest { file };
            let signed = video::issue_video_link(backend.as_ref(), &config.storage, &request)
                .await
                .context("issue video link failed")?;
            println!("{}", signed.url);
            eprintln!("(expires in {}s)", signed.expires_in_seconds);
        }
        Commands::CheckConfig => {
            println!(
                "provider={} base={} model={} timeout={}s",
                config.upstream.provider,
                config.upstream.api_base,
                config.upstream.model,
                config.upstream.timeout.as_secs()
            );
            println!(
                "storage={} bucket={} default_file={}",
                config.storage.base_url, config.storage.bucket, config.storage.default_file
            );
            println!(
                "listen={} ui_dir={} telemetry={}",
                config.server.listen_addr(),
                config.server.ui_dir,
                config.server.telemetry_enabled
            );
        }
    }

    Ok(())
}
