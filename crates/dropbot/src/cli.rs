use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dropbot")]
#[command(author, version, about = "Telegram bot that fetches media, thumbnails and subtitles with yt-dlp", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot (default)
    Run,

    /// Print the yt-dlp command the bot would hand out for a link
    Command {
        /// YouTube link
        url: String,

        /// video, audio, image, subtitles or all
        #[arg(short, long, default_value = "video")]
        category: String,

        /// Video quality cap, e.g. 720p
        #[arg(short, long)]
        quality: Option<String>,

        /// User id used for the output directory
        #[arg(short, long, default_value_t = 0)]
        user: i64,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
