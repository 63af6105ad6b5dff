//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small listing site and run the full
//! search and detail cycle end-to-end with the static HTML backend and a
//! SQLite database in a temporary directory.

use casa_ripple::config::{load_config, Config};
use casa_ripple::crawler::{run, PhaseSelection, RunOptions};
use casa_ripple::listing::Proposal;
use casa_ripple::output::load_statistics;
use casa_ripple::storage::{SqliteStorage, Store};
use casa_ripple::{CasaError, ConfigError};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><head><title>Imóveis</title></head><body>{body}</body></html>"))
        .insert_header("content-type", "text/html; charset=utf-8")
}

fn card(id: u32, price: &str) -> String {
    format!(
        r#"<article class="card">
             <a class="link" href="/imovel/{id}">Apartamento {id}</a>
             <span class="price">{price}</span>
             <span class="tipo">Venda</span>
           </article>"#
    )
}

fn listing_page(broker: &str, bedrooms: &str, picture: Option<&str>) -> String {
    let picture = picture
        .map(|src| format!(r#"<img class="foto" src="{src}">"#))
        .unwrap_or_default();
    format!(
        r#"<h1>Apartamento</h1>
           <p class="endereco">Rua da Praia, 100 - Centro</p>
           <div class="corretor">{broker}</div>
           <span class="quartos">{bedrooms}</span>
           {picture}"#
    )
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let picture = RgbImage::from_pixel(width, height, Rgb([20, 120, 200]));
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(picture)
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// Mounts a site with two result pages and four listings
///
/// Listing 2 is gone (HTTP 404); listing 1 has a picture.
async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<h1>Bem-vindo</h1>"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/venda"))
        .and(query_param("cidade", "Porto Alegre"))
        .respond_with(html(&format!(
            r#"{}{}{}<a class="next" href="/venda/2">Próxima</a>"#,
            card(1, "R$ 450.000"),
            card(2, "R$ 520.000"),
            card(3, "R$ 610.000")
        )))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/venda/2"))
        .respond_with(html(&card(4, "R$ 700.000")))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/imovel/1"))
        .respond_with(html(&listing_page("Jane Realty", "3 quartos", Some("/fotos/1.png"))))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/imovel/2"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/imovel/3"))
        .respond_with(html(&listing_page("Casa Sul Corretora", "2 quartos", None)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/imovel/4"))
        .respond_with(html(&listing_page("Jane Realty", "4 quartos", None)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/fotos/1.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png(16, 12))
                .insert_header("content-type", "image/png"),
        )
        .mount(server)
        .await;
}

fn publisher_block(name: &str, website: &str, buying_url: &str) -> String {
    format!(
        r#"
[[publisher]]
name = "{name}"
website = "{website}"
searchers = ["buying"]

[publisher.search.base]
locations = ["Porto Alegre"]

[publisher.query]
buying-url = "{buying_url}"

[publisher.query.params]
location = "cidade"

[publisher.results]
item = "article.card"
next-page = "a.next"

[publisher.summary.fields]
url = {{ selector = "a.link", attribute = "href", parse = "url" }}
price = {{ selector = ".price", parse = "decimal" }}
proposal = {{ selector = ".tipo" }}

[publisher.detail]
picture-selector = "img.foto"

[publisher.detail.fields]
address = {{ selector = ".endereco" }}
broker = {{ selector = ".corretor" }}
bedrooms = {{ selector = ".quartos", parse = "integer" }}
"#
    )
}

/// Writes a configuration file for the given publisher blocks and loads it
fn create_test_config(dir: &TempDir, publishers: &[String]) -> Config {
    let db_path = dir.path().join("listings.db");
    let content = format!(
        r#"
[browser]
backend = "static"
navigation-timeout-secs = 5

[storage]
database-path = "{}"

[crawl]
batch-size = 2
wait-ms = 10
scroll-pause-ms = 0
{}"#,
        db_path.display(),
        publishers.concat()
    );
    let config_path = dir.path().join("casa.toml");
    std::fs::write(&config_path, content).unwrap();
    load_config(&config_path).unwrap()
}

fn open(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.storage.database_path)).unwrap()
}

#[tokio::test]
async fn test_full_crawl_single_publisher() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        &dir,
        &[publisher_block("sul", &format!("{base}/"), &format!("{base}/venda"))],
    );

    let outcomes = run(&config, &RunOptions::default()).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    let report = outcomes[0].result.as_ref().unwrap();
    assert_eq!(report.search.pages, 2);
    assert_eq!(report.search.listings, 4);
    assert_eq!(report.detail.listings, 3);
    assert_eq!(report.detail.deleted, 1);
    assert_eq!(report.detail.failed, 0);

    let storage = open(&config);

    let first = storage.get(&format!("{base}/imovel/1")).unwrap().unwrap();
    assert_eq!(first.publisher.as_deref(), Some("sul"));
    assert_eq!(first.proposal, Some(Proposal::Sell));
    assert_eq!(first.price, Some(450_000.0));
    assert_eq!(first.broker.as_deref(), Some("Jane Realty"));
    assert_eq!(first.bedrooms, Some(3));
    assert_eq!(first.address.as_deref(), Some("Rua da Praia, 100 - Centro"));
    assert!(first
        .search_url
        .as_deref()
        .is_some_and(|url| url.contains("/venda?cidade=Porto+Alegre")));
    assert!(!first.to_inspect);
    assert!(!first.deleted);
    let preview = image::load_from_memory(first.preview.as_deref().unwrap()).unwrap();
    assert_eq!(preview.width(), 16);

    let gone = storage.get(&format!("{base}/imovel/2")).unwrap().unwrap();
    assert!(gone.deleted);
    assert!(!gone.to_inspect);
    assert_eq!(gone.broker, None);
    assert_eq!(gone.price, Some(520_000.0));

    let second_page = storage.get(&format!("{base}/imovel/4")).unwrap().unwrap();
    assert_eq!(
        second_page.search_url.as_deref(),
        Some(format!("{base}/venda/2").as_str())
    );
    assert_eq!(second_page.bedrooms, Some(4));
    assert!(second_page.preview.is_none());

    let stats = load_statistics(&storage).unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.detailed, 3);
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_phases_can_run_separately() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        &dir,
        &[publisher_block("sul", &format!("{base}/"), &format!("{base}/venda"))],
    );

    let search_only = RunOptions {
        phase: PhaseSelection::Search,
        ..RunOptions::default()
    };
    let outcomes = run(&config, &search_only).await.unwrap();
    let report = outcomes[0].result.as_ref().unwrap();
    assert_eq!(report.search.listings, 4);
    assert_eq!(report.detail.listings, 0);

    {
        let storage = open(&config);
        let pending = storage.get(&format!("{base}/imovel/3")).unwrap().unwrap();
        assert!(pending.to_inspect);
        assert_eq!(pending.broker, None);
        assert_eq!(load_statistics(&storage).unwrap().pending, 4);
    }

    let detail_only = RunOptions {
        phase: PhaseSelection::Detail,
        only_inspect: true,
        ..RunOptions::default()
    };
    let outcomes = run(&config, &detail_only).await.unwrap();
    let report = outcomes[0].result.as_ref().unwrap();
    assert_eq!(report.search.pages, 0);
    assert_eq!(report.detail.listings, 3);
    assert_eq!(report.detail.deleted, 1);

    let storage = open(&config);
    let detailed = storage.get(&format!("{base}/imovel/3")).unwrap().unwrap();
    assert!(!detailed.to_inspect);
    assert_eq!(detailed.broker.as_deref(), Some("Casa Sul Corretora"));
}

#[tokio::test]
async fn test_failed_publisher_does_not_stop_the_others() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        &dir,
        &[
            // nothing listens on the discard port
            publisher_block("norte", &format!("{base}/"), "http://127.0.0.1:9/venda"),
            publisher_block("sul", &format!("{base}/"), &format!("{base}/venda")),
        ],
    );

    let outcomes = run(&config, &RunOptions::default()).await.unwrap();
    assert_eq!(outcomes.len(), 2);

    assert_eq!(outcomes[0].name, "norte");
    assert!(matches!(
        outcomes[0].result,
        Err(CasaError::Phase { phase: "search", .. })
    ));

    assert_eq!(outcomes[1].name, "sul");
    assert_eq!(outcomes[1].result.as_ref().unwrap().search.listings, 4);
}

#[tokio::test]
async fn test_like_filter_selects_publishers() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        &dir,
        &[
            publisher_block("norte", &format!("{base}/"), "http://127.0.0.1:9/venda"),
            publisher_block("sul", &format!("{base}/"), &format!("{base}/venda")),
        ],
    );

    let options = RunOptions {
        like: Some("SUL".into()),
        phase: PhaseSelection::Search,
        ..RunOptions::default()
    };
    let outcomes = run(&config, &options).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].name, "sul");
    assert!(outcomes[0].result.is_ok());
}

#[test]
fn test_invalid_crawl_settings_are_rejected() {
    let dir = TempDir::new().unwrap();
    let content = format!(
        r#"
[storage]
database-path = "{}"

[crawl]
wait-ms = 1
{}"#,
        dir.path().join("listings.db").display(),
        publisher_block("sul", "https://imoveis.example.com/", "https://imoveis.example.com/venda")
    );
    let config_path = dir.path().join("casa.toml");
    std::fs::write(&config_path, content).unwrap();

    let result = load_config(&config_path);
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}
