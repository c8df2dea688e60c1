use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use regex::Regex;
use tracing_subscriber::EnvFilter;

use glimpse_client::{CdpBackend, FsCache};
use glimpse_core::{
    Document, DocumentTree, LinkProcessor, Node, NullDeriver, Options, TracingReporter,
};

#[derive(Parser)]
#[command(name = "glimpse", version, about = "Enrich markdown links into cards and previews")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RenderOpts {
    /// Link text that marks a link to be rendered as a card
    #[arg(long, default_value = "$card")]
    delimiter: String,

    /// Per-navigation timeout in milliseconds
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,

    /// JPEG quality for preview screenshots (0-100)
    #[arg(long, default_value_t = 80)]
    screenshot_quality: u8,

    /// Omit favicons from rendered cards
    #[arg(long, default_value_t = false)]
    hide_favicon: bool,

    /// Number of browser workers to launch
    #[arg(long, default_value_t = 2)]
    pool_size: usize,

    /// Page slots per worker
    #[arg(long, default_value_t = 5)]
    pages_per_worker: usize,

    /// Extra flag passed to the browser at launch (repeatable)
    #[arg(long = "launch-arg")]
    launch_args: Vec<String>,

    /// Card title for unreachable pages without a usable hostname
    #[arg(long, default_value = "Not Found Site")]
    error_title: String,

    /// Cache directory for rendered HTML and screenshot artifacts
    #[arg(long, default_value = ".cache/glimpse")]
    cache_dir: PathBuf,
}

impl RenderOpts {
    fn to_options(&self) -> Options {
        Options::default()
            .with_delimiter(&self.delimiter)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_screenshot_quality(self.screenshot_quality)
            .with_pool_size(self.pool_size)
            .with_pages_per_worker(self.pages_per_worker)
            .with_cache_dir(&self.cache_dir)
            .with_show_favicon(!self.hide_favicon)
            .with_launch_args(self.launch_args.clone())
            .with_error_title(&self.error_title)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich every link in a markdown file
    Process {
        /// Input markdown file
        input: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        render: RenderOpts,
    },

    /// Render a single URL as a card and print the HTML
    Card {
        /// Target URL
        url: String,

        #[command(flatten)]
        render: RenderOpts,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("glimpse=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            output,
            render,
        } => cmd_process(&input, output.as_deref(), &render).await,
        Commands::Card { url, render } => cmd_card(&url, &render).await,
    }
}

async fn cmd_process(
    input: &std::path::Path,
    output: Option<&std::path::Path>,
    render: &RenderOpts,
) -> Result<()> {
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;
    let mut doc = parse_markdown(&source);

    let links = doc.links().len();
    tracing::info!(file = %input.display(), %links, "Processing document");

    let options = render.to_options();
    let processor = LinkProcessor::new(
        CdpBackend::new(),
        FsCache::new(&render.cache_dir),
        TracingReporter,
        NullDeriver,
        options,
    );
    processor
        .process(&mut doc)
        .await
        .context("Processing failed")?;

    let rendered = doc.to_text();
    match output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write output file: {}", path.display()))?,
        None => print!("{rendered}"),
    }
    Ok(())
}

async fn cmd_card(url: &str, render: &RenderOpts) -> Result<()> {
    let options = render.to_options();
    let delimiter = options.delimiter.clone();
    let processor = LinkProcessor::new(
        CdpBackend::new(),
        FsCache::new(&render.cache_dir),
        TracingReporter,
        NullDeriver,
        options,
    );

    let mut doc = Document::new(vec![Node::Link {
        url: url.to_string(),
        text: delimiter,
    }]);
    processor
        .process(&mut doc)
        .await
        .context("Processing failed")?;

    match &doc.nodes()[0] {
        Node::Html(html) => println!("{html}"),
        _ => anyhow::bail!("Link was not rendered (invalid URL?): {url}"),
    }
    Ok(())
}

/// Split markdown into text and `[text](url)` link nodes.
///
/// Image syntax (`![alt](src)`) is left as text; only plain links are
/// enrichment candidates.
fn parse_markdown(source: &str) -> Document {
    let link_re = Regex::new(r"(!?)\[([^\]]*)\]\(([^)\s]+)\)").expect("static regex");
    let mut doc = Document::default();
    let mut cursor = 0;

    for caps in link_re.captures_iter(source) {
        let whole = caps.get(0).expect("group 0 always present");
        if whole.start() > cursor {
            doc.push(Node::Text(source[cursor..whole.start()].to_string()));
        }
        if caps.get(1).is_some_and(|bang| !bang.as_str().is_empty()) {
            // image, not a link
            doc.push(Node::Text(whole.as_str().to_string()));
        } else {
            doc.push(Node::Link {
                text: caps[2].to_string(),
                url: caps[3].to_string(),
            });
        }
        cursor = whole.end();
    }
    if cursor < source.len() {
        doc.push(Node::Text(source[cursor..].to_string()));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_links_and_preserves_text() {
        let doc = parse_markdown("see [docs](https://docs.rs) and [$card](https://tokio.rs)!");
        let links = doc.links();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].text, "docs");
        assert_eq!(links[1].url, "https://tokio.rs");
        assert_eq!(
            doc.to_text(),
            "see [docs](https://docs.rs) and [$card](https://tokio.rs)!"
        );
    }

    #[test]
    fn images_are_not_links() {
        let doc = parse_markdown("![alt](img.png) and [real](https://example.com)");
        assert_eq!(doc.links().len(), 1);
        assert_eq!(doc.links()[0].url, "https://example.com");
    }

    #[test]
    fn plain_text_roundtrips() {
        let source = "no links here at all";
        assert_eq!(parse_markdown(source).to_text(), source);
    }
}
