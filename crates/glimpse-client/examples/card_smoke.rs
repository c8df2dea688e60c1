/// Smoke-test for `CdpBackend`.
///
/// Launches a headless Chromium, renders a card for <https://example.com>,
/// and prints the resulting HTML fragment.
///
/// Run with:
///   cargo run --example card_smoke
use glimpse_client::CdpBackend;
use glimpse_core::{Document, LinkProcessor, Node, NullCache, NullDeriver, Options, TracingReporter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let options = Options::default().with_pool_size(1);
    let processor = LinkProcessor::new(
        CdpBackend::new(),
        NullCache,
        TracingReporter,
        NullDeriver,
        options,
    );

    let mut doc = Document::new(vec![Node::Link {
        url: "https://example.com".into(),
        text: "$card".into(),
    }]);
    processor.process(&mut doc).await?;

    match &doc.nodes()[0] {
        Node::Html(html) => println!("{html}"),
        other => anyhow::bail!("link was not rendered: {other:?}"),
    }
    Ok(())
}
