//! コマンドライン引数

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::DeviceType;

#[derive(Parser, Debug)]
#[command(name = "book_lens", author, version, about = "書籍カメラ認識と貸し借りカタログ")]
pub struct Cli {
    /// 設定ファイル
    #[arg(long, global = true, default_value = "config.json")]
    pub config: PathBuf,
    /// ストアのスナップショットファイル（設定より優先）
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    /// 推論デバイス（設定より優先）
    #[arg(long, global = true, value_enum)]
    pub device: Option<DeviceArg>,
    /// モデルバンドル（設定より優先）
    #[arg(long, global = true)]
    pub model: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceArg {
    Cpu,
    Wgpu,
}

impl From<DeviceArg> for DeviceType {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Cpu => DeviceType::Cpu,
            DeviceArg::Wgpu => DeviceType::Wgpu,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 画像1枚を認識する
    Classify {
        image: PathBuf,
        /// 信頼度しきい値（設定より優先）
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// ディレクトリ内の画像を一括認識してCSVに出力する
    Batch {
        images_dir: PathBuf,
        #[arg(long, default_value = "batch_report.csv")]
        output: PathBuf,
    },
    /// ランダム初期化したモデルバンドルを作成する（動作確認用）
    InitModel {
        #[arg(long, default_value = "models/book_classifier")]
        output: PathBuf,
        /// カンマ区切りのラベル
        #[arg(long)]
        labels: Option<String>,
        /// ラベル一覧ファイル（1行1ラベル）
        #[arg(long)]
        labels_file: Option<PathBuf>,
        #[arg(long, default_value_t = 128)]
        hidden_size: usize,
        #[arg(long, default_value_t = crate::types::MODEL_INPUT_SIZE)]
        input_size: u32,
    },
    /// モデルバンドルのメタデータを表示する
    InspectModel { path: Option<PathBuf> },
    /// 設定ファイル
    #[command(subcommand)]
    Config(ConfigCommand),
    /// ユーザー
    #[command(subcommand)]
    User(UserCommand),
    /// 書籍
    #[command(subcommand)]
    Books(BooksCommand),
    /// ブログ
    #[command(subcommand)]
    Blogs(BlogsCommand),
    /// 貸し出し申請
    #[command(subcommand)]
    Rentals(RentalsCommand),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 現在の設定を表示
    Show,
    /// デフォルト設定を書き出す
    Init {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    Register {
        uid: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
}

/// 操作するユーザー
#[derive(Args, Debug)]
pub struct AsUser {
    #[arg(long = "as")]
    pub uid: String,
}

#[derive(Subcommand, Debug)]
pub enum BooksCommand {
    /// 書籍を投稿する。画像を指定するとカテゴリを認識で埋める
    Post {
        #[command(flatten)]
        user: AsUser,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        author: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = crate::catalog::DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
    Like {
        #[command(flatten)]
        user: AsUser,
        id: String,
    },
    Dislike {
        #[command(flatten)]
        user: AsUser,
        id: String,
    },
    Comment {
        #[command(flatten)]
        user: AsUser,
        id: String,
        text: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum BlogsCommand {
    Post {
        #[command(flatten)]
        user: AsUser,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = crate::catalog::DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
    Like {
        #[command(flatten)]
        user: AsUser,
        id: String,
    },
    Dislike {
        #[command(flatten)]
        user: AsUser,
        id: String,
    },
    Comment {
        #[command(flatten)]
        user: AsUser,
        id: String,
        text: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum RentalsCommand {
    Request {
        #[command(flatten)]
        user: AsUser,
        book_id: String,
        #[arg(long)]
        message: Option<String>,
    },
    Respond {
        #[command(flatten)]
        user: AsUser,
        notification_id: String,
        #[arg(long, value_enum)]
        decision: RentalAnswer,
    },
    List {
        #[command(flatten)]
        user: AsUser,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RentalAnswer {
    Approve,
    Decline,
}
