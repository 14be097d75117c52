pub mod types;
pub mod error;
pub mod cli;
mod csv_report;
mod recognition_commands;
mod catalog_commands;

// 書籍認識
pub mod recognition;
pub mod model;
#[cfg(feature = "ml")]
pub mod ml;

// カタログ
pub mod store;
pub mod session;
pub mod catalog;

pub use csv_report::{BatchRow, ClassSummary};
pub use recognition_commands::{load_model, LoadedModel};

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use catalog::{BlogDraft, BookDraft};
use cli::{BlogsCommand, BooksCommand, Cli, Command, ConfigCommand, RentalAnswer, RentalsCommand, UserCommand};
use model::{AppConfig, DecisionSettings, DEFAULT_CLASS_LABELS};
use recognition::Decision;
use session::SessionContext;
use store::{DocumentStore, MemoryStore};

/// ストアファイルのデフォルトパス
const DEFAULT_STORE_PATH: &str = "data/store.json";

/// 1回のコマンド実行で共有する状態
pub struct AppState {
    config: AppConfig,
    config_path: PathBuf,
    store: Arc<MemoryStore>,
    store_path: PathBuf,
}

impl AppState {
    /// 設定とストアを読み込む
    pub fn open(config_path: &Path, store_override: Option<PathBuf>) -> Result<Self> {
        let config = AppConfig::load_or_default_from(config_path);
        let store_path = store_override
            .or_else(|| config.store_path.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
        let store = MemoryStore::load(&store_path)
            .with_context(|| format!("ストアの読み込みエラー: {}", store_path.display()))?;

        Ok(Self {
            config,
            config_path: config_path.to_path_buf(),
            store: Arc::new(store),
            store_path,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    /// ログイン中ユーザーのセッションを開始
    pub fn session(&self, uid: &str) -> Result<SessionContext> {
        SessionContext::mount(self.store(), uid)
            .with_context(|| format!("ユーザーを読み込めません: {}", uid))
    }

    /// ストアをスナップショットに保存
    pub fn persist(&self) -> Result<()> {
        self.store
            .save(&self.store_path)
            .with_context(|| format!("ストアの保存エラー: {}", self.store_path.display()))
    }

    /// 最後に認識した画像を設定ファイルに記録する
    ///
    /// コマンドライン引数による上書きは保存しない。
    fn remember_image(&self, image: &Path) -> Result<()> {
        let mut saved = AppConfig::load_or_default_from(&self.config_path);
        saved.update_last_image_path(image);
        saved.save(&self.config_path)
    }
}

/// ログ出力を初期化
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("book_lens=info,book_lens_lib=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_decision(image: &Path, decision: &Decision) {
    println!("=== 認識結果: {} ===", image.display());
    match decision {
        Decision::Label {
            label, confidence, ..
        } => println!("カテゴリ: {} (確信度 {:.1}%)", label, confidence * 100.0),
        Decision::LowConfidence { confidence } => {
            println!("判定できませんでした (最大確率 {:.1}%)", confidence * 100.0)
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut state = AppState::open(&cli.config, cli.store.clone())?;
    if let Some(device) = cli.device {
        state.config_mut().device_type = device.into();
    }
    if let Some(model) = &cli.model {
        state.config_mut().model.model_path = model.to_string_lossy().to_string();
    }

    let runtime = tokio::runtime::Runtime::new().context("tokio ランタイムの起動エラー")?;
    runtime.block_on(dispatch(state, cli.config, cli.command))
}

async fn dispatch(mut state: AppState, config_path: PathBuf, command: Command) -> Result<()> {
    match command {
        Command::Classify { image, threshold } => {
            if let Some(threshold) = threshold {
                DecisionSettings::validate_threshold(threshold)?;
                state.config_mut().decision.confidence_threshold = threshold;
            }
            let model = load_model(state.config())?;
            let decision = recognition_commands::classify_image(state.config(), &model, &image).await?;
            print_decision(&image, &decision);
            state.remember_image(&image)?;
        }
        Command::Batch { images_dir, output } => {
            let model = load_model(state.config())?;
            let outcome =
                recognition_commands::batch_classify(state.config(), &model, &images_dir, &output).await?;
            println!("{}", outcome.message);
            for summary in &outcome.summary {
                println!("  {}: {}枚", summary.class_name, summary.count);
            }
        }
        Command::InitModel {
            output,
            labels,
            labels_file,
            hidden_size,
            input_size,
        } => {
            let labels = recognition_commands::resolve_labels(labels.as_deref(), labels_file.as_deref())?
                .unwrap_or_else(|| DEFAULT_CLASS_LABELS.iter().map(|s| s.to_string()).collect());
            let path = recognition_commands::init_model(&output, labels, hidden_size, input_size)?;
            println!("✓ モデルバンドルを作成しました: {}", path.display());
        }
        Command::InspectModel { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(&state.config().model.model_path));
            recognition_commands::inspect_model(&path)?;
        }
        Command::Config(ConfigCommand::Show) => state.config().display(),
        Command::Config(ConfigCommand::Init { force }) => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "設定ファイルが既に存在します: {} (--force で上書き)",
                    config_path.display()
                );
            }
            AppConfig::default().save(&config_path)?;
            info!("設定ファイルを保存しました: {}", config_path.display());
            println!("✓ 設定ファイルを作成しました: {}", config_path.display());
        }
        Command::User(UserCommand::Register { uid, name, email }) => {
            catalog_commands::register_user(&state, &uid, &name, &email)?;
        }
        Command::Books(books) => dispatch_books(&state, books).await?,
        Command::Blogs(blogs) => dispatch_blogs(&state, blogs)?,
        Command::Rentals(rentals) => dispatch_rentals(&state, rentals)?,
    }
    Ok(())
}

async fn dispatch_books(state: &AppState, command: BooksCommand) -> Result<()> {
    match command {
        BooksCommand::Post {
            user,
            title,
            author,
            description,
            category,
            image,
        } => {
            let recognition = match &image {
                Some(image) => {
                    let model = load_model(state.config())?;
                    Some(recognition_commands::classify_image(state.config(), &model, image).await?)
                }
                None => None,
            };
            let mut draft = BookDraft::new(title, author);
            draft.description = description;
            draft.category = category;
            catalog_commands::post_book(state, &user.uid, draft, recognition.as_ref())?;
        }
        BooksCommand::List { page, page_size } => catalog_commands::list_books(state, page, page_size)?,
        BooksCommand::Like { user, id } => catalog_commands::like_book(state, &user.uid, &id, true)?,
        BooksCommand::Dislike { user, id } => catalog_commands::like_book(state, &user.uid, &id, false)?,
        BooksCommand::Comment { user, id, text } => {
            catalog_commands::comment_book(state, &user.uid, &id, &text)?
        }
    }
    Ok(())
}

fn dispatch_blogs(state: &AppState, command: BlogsCommand) -> Result<()> {
    match command {
        BlogsCommand::Post { user, title, body } => {
            catalog_commands::post_blog(state, &user.uid, BlogDraft { title, body })
        }
        BlogsCommand::List { page, page_size } => catalog_commands::list_blogs(state, page, page_size),
        BlogsCommand::Like { user, id } => catalog_commands::like_blog(state, &user.uid, &id, true),
        BlogsCommand::Dislike { user, id } => catalog_commands::like_blog(state, &user.uid, &id, false),
        BlogsCommand::Comment { user, id, text } => {
            catalog_commands::comment_blog(state, &user.uid, &id, &text)
        }
    }
}

fn dispatch_rentals(state: &AppState, command: RentalsCommand) -> Result<()> {
    match command {
        RentalsCommand::Request {
            user,
            book_id,
            message,
        } => catalog_commands::request_rental(state, &user.uid, &book_id, message),
        RentalsCommand::Respond {
            user,
            notification_id,
            decision,
        } => catalog_commands::respond_rental(
            state,
            &user.uid,
            &notification_id,
            decision == RentalAnswer::Approve,
        ),
        RentalsCommand::List { user } => catalog_commands::list_notifications(state, &user.uid),
    }
}
