use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "stagehand")]
#[command(about = "Drives a sandboxed sample page through the inspector protocol")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub demo: DemoArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scripted editor session and print the resulting editor state
    Demo(DemoArgs),

    /// Print the stable selector of every element in the sample page
    Selectors,
}

#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    /// Canvas zoom factor (clamped to 0.1..=3.0)
    #[arg(long, default_value_t = 1.0)]
    pub zoom: f64,

    /// Horizontal canvas pan in host pixels
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub pan_x: f64,

    /// Vertical canvas pan in host pixels
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub pan_y: f64,

    /// Delay before the page's animation library finishes loading
    #[arg(long, default_value_t = 250)]
    pub library_delay_ms: u64,

    /// Never load the animation library
    #[arg(long)]
    pub no_library: bool,

    /// Selector of the element to hover, click and animate
    #[arg(long, default_value = ".box:nth-of-type(2)")]
    pub target: String,

    /// Give up if the handshake has not completed after this many milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub handshake_timeout_ms: u64,
}
