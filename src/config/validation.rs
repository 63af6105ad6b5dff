use crate::config::types::{
    Config, CrawlSettings, FieldRule, PublisherConfig, QueryConfig, SearcherKind,
    MAX_LOOK_BACK_MINUTES,
};
use crate::extract::{FieldKind, Schema};
use crate::listing::{DETAIL_SCHEMA, SUMMARY_SCHEMA};
use crate::ConfigError;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_settings(&config.crawl)?;

    if config.storage.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.publishers.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[publisher]] must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for publisher in &config.publishers {
        if !names.insert(publisher.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate publisher name '{}'",
                publisher.name
            )));
        }
        validate_publisher(publisher)?;
    }

    Ok(())
}

/// Validates crawl pacing settings
fn validate_crawl_settings(settings: &CrawlSettings) -> Result<(), ConfigError> {
    if settings.batch_size < 1 || settings.batch_size > 100 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be between 1 and 100, got {}",
            settings.batch_size
        )));
    }

    if settings.wait_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "wait_ms must be >= 10ms, got {}ms",
            settings.wait_ms
        )));
    }

    if settings.scroll_step == 0 {
        return Err(ConfigError::Validation(
            "scroll_step must be greater than 0".to_string(),
        ));
    }

    if settings.look_back_minutes > MAX_LOOK_BACK_MINUTES {
        return Err(ConfigError::Validation(format!(
            "look_back_minutes must be at most {}, got {}",
            MAX_LOOK_BACK_MINUTES, settings.look_back_minutes
        )));
    }

    Ok(())
}

/// Validates one publisher profile
fn validate_publisher(publisher: &PublisherConfig) -> Result<(), ConfigError> {
    if publisher.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "publisher name cannot be empty".to_string(),
        ));
    }

    validate_http_url(&publisher.website, &publisher.name)?;

    if publisher.searchers.is_empty() {
        return Err(ConfigError::Validation(format!(
            "publisher '{}' has no searchers",
            publisher.name
        )));
    }

    match (&publisher.form, &publisher.query) {
        (None, None) => {
            return Err(ConfigError::Validation(format!(
                "publisher '{}' needs either a [publisher.form] or a [publisher.query] section",
                publisher.name
            )))
        }
        (_, Some(query)) => validate_query(query, &publisher.searchers, &publisher.name)?,
        _ => {}
    }

    if publisher.results.item.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "publisher '{}' has an empty results item selector",
            publisher.name
        )));
    }

    if !publisher.summary.fields.contains_key("url") {
        return Err(ConfigError::Validation(format!(
            "publisher '{}' summary fields must include 'url'",
            publisher.name
        )));
    }

    validate_fields(&publisher.summary.fields, &SUMMARY_SCHEMA, &publisher.name)?;
    validate_fields(&publisher.detail.fields, &DETAIL_SCHEMA, &publisher.name)?;

    if let Some(pattern) = &publisher.detail.picture_url_pattern {
        validate_regex(pattern)?;
    }

    Ok(())
}

/// Validates the URLs of the query driver
fn validate_query(
    query: &QueryConfig,
    searchers: &[SearcherKind],
    publisher: &str,
) -> Result<(), ConfigError> {
    for kind in searchers {
        let url = match kind {
            SearcherKind::Buying => &query.buying_url,
            SearcherKind::Renting => &query.renting_url,
        };
        match url {
            Some(url) => validate_http_url(url, publisher)?,
            None => {
                return Err(ConfigError::Validation(format!(
                    "publisher '{}' runs the {} searcher but has no {}-url",
                    publisher,
                    kind.as_str(),
                    kind.as_str()
                )))
            }
        }
    }
    Ok(())
}

/// Validates field rules against the schema they feed
fn validate_fields(
    fields: &BTreeMap<String, FieldRule>,
    schema: &Schema,
    publisher: &str,
) -> Result<(), ConfigError> {
    for (name, rule) in fields {
        let spec = schema.field(name).ok_or_else(|| {
            ConfigError::Validation(format!(
                "publisher '{}': '{}' is not a {} field",
                publisher, name, schema.name
            ))
        })?;

        let produced = rule.parse.produces();
        let compatible =
            produced == spec.kind || (produced == FieldKind::Integer && spec.kind == FieldKind::Decimal);
        if !compatible {
            return Err(ConfigError::Validation(format!(
                "publisher '{}': {} field '{}' expects {} but parses as {}",
                publisher,
                schema.name,
                name,
                spec.kind.as_str(),
                produced.as_str()
            )));
        }

        if let Some(pattern) = &rule.pattern {
            validate_regex(pattern)?;
        }
    }
    Ok(())
}

fn validate_http_url(raw: &str, publisher: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| {
        ConfigError::InvalidUrl(format!("publisher '{}': '{}': {}", publisher, raw, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "publisher '{}': '{}' must use http or https",
            publisher, raw
        )));
    }

    Ok(())
}

fn validate_regex(pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern(format!("{pattern}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ParseKind;

    fn rule(parse: ParseKind) -> FieldRule {
        FieldRule {
            selector: None,
            attribute: None,
            parse,
            pattern: None,
            format: None,
        }
    }

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("https://imoveis.example.com/", "p").is_ok());
        assert!(validate_http_url("http://localhost:8080/", "p").is_ok());

        assert!(validate_http_url("ftp://imoveis.example.com/", "p").is_err());
        assert!(validate_http_url("not a url", "p").is_err());
    }

    #[test]
    fn test_validate_crawl_settings() {
        assert!(validate_crawl_settings(&CrawlSettings::default()).is_ok());

        let settings = CrawlSettings {
            batch_size: 0,
            ..CrawlSettings::default()
        };
        assert!(validate_crawl_settings(&settings).is_err());

        let settings = CrawlSettings {
            wait_ms: 5,
            ..CrawlSettings::default()
        };
        assert!(validate_crawl_settings(&settings).is_err());

        let settings = CrawlSettings {
            scroll_step: 0,
            ..CrawlSettings::default()
        };
        assert!(validate_crawl_settings(&settings).is_err());

        let settings = CrawlSettings {
            look_back_minutes: MAX_LOOK_BACK_MINUTES,
            ..CrawlSettings::default()
        };
        assert!(validate_crawl_settings(&settings).is_ok());

        for look_back_minutes in [MAX_LOOK_BACK_MINUTES + 1, 1_000_000_000_000, u64::MAX] {
            let settings = CrawlSettings {
                look_back_minutes,
                ..CrawlSettings::default()
            };
            assert!(validate_crawl_settings(&settings).is_err());
        }
    }

    #[test]
    fn test_validate_fields_against_schema() {
        let mut fields = BTreeMap::new();
        fields.insert("price".to_string(), rule(ParseKind::Decimal));
        fields.insert("area".to_string(), rule(ParseKind::Integer));
        assert!(validate_fields(&fields, &SUMMARY_SCHEMA, "p").is_ok());

        // integers widen into decimal fields
        fields.insert("condo_fee".to_string(), rule(ParseKind::Integer));
        assert!(validate_fields(&fields, &SUMMARY_SCHEMA, "p").is_ok());

        let mut unknown = BTreeMap::new();
        unknown.insert("swimming_pool".to_string(), rule(ParseKind::Flag));
        assert!(validate_fields(&unknown, &SUMMARY_SCHEMA, "p").is_err());

        let mut mismatched = BTreeMap::new();
        mismatched.insert("broker".to_string(), rule(ParseKind::Integer));
        assert!(validate_fields(&mismatched, &DETAIL_SCHEMA, "p").is_err());

        let mut bad_pattern = BTreeMap::new();
        bad_pattern.insert(
            "price".to_string(),
            FieldRule {
                pattern: Some("([0-9".to_string()),
                ..rule(ParseKind::Decimal)
            },
        );
        assert!(matches!(
            validate_fields(&bad_pattern, &SUMMARY_SCHEMA, "p"),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_validate_query_needs_url_per_searcher() {
        let query = QueryConfig {
            buying_url: Some("https://imoveis.example.com/venda".into()),
            ..QueryConfig::default()
        };
        assert!(validate_query(&query, &[SearcherKind::Buying], "p").is_ok());
        assert!(validate_query(
            &query,
            &[SearcherKind::Buying, SearcherKind::Renting],
            "p"
        )
        .is_err());
    }
}
