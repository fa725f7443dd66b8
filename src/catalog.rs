// catalog.rs — Remote repository list extraction.
//
// The catalog page embeds its repository list as JSON in a data-props
// attribute on the parent of the element with id "models". Any missing link
// in that chain is fatal for the run; a partial catalog is not usable.

use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use crate::config;
use crate::error::{Result, SyncError};
use crate::transport::Transport;

#[derive(Debug, Deserialize)]
struct CatalogProps {
    repos: Vec<CatalogRepo>,
}

#[derive(Debug, Deserialize)]
struct CatalogRepo {
    id: String,
}

/// Fetch the catalog page and return repository ids in document order.
pub fn list_repositories(transport: &dyn Transport, url: &str) -> Result<Vec<String>> {
    log::info!("Loading latest embedding repository list from {url}");
    let page = transport.fetch(url)?;
    let html = String::from_utf8_lossy(&page.body);

    let ids = parse_catalog(&html)?;
    let suffix = if ids.len() == 1 { "" } else { "s" };
    log::info!("Found {} repo{suffix}", ids.len());
    Ok(ids)
}

fn parse_catalog(html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);

    let selector = Selector::parse(config::catalog::MODELS_SELECTOR)
        .map_err(|e| catalog_err(format!("bad marker selector: {e}")))?;
    let marker = document.select(&selector).next().ok_or_else(|| {
        catalog_err(format!(
            "page has no {} element",
            config::catalog::MODELS_SELECTOR
        ))
    })?;

    let parent = marker
        .parent()
        .and_then(ElementRef::wrap)
        .ok_or_else(|| catalog_err("marker element has no parent element"))?;
    let props = parent
        .value()
        .attr(config::catalog::DATA_PROPS_ATTR)
        .ok_or_else(|| {
            catalog_err(format!(
                "parent element lacks the {} attribute",
                config::catalog::DATA_PROPS_ATTR
            ))
        })?;

    let parsed: CatalogProps = serde_json::from_str(props).map_err(|e| {
        catalog_err(format!(
            "invalid {} JSON: {e}",
            config::catalog::DATA_PROPS_ATTR
        ))
    })?;
    Ok(parsed.repos.into_iter().map(|r| r.id).collect())
}

fn catalog_err(message: impl Into<String>) -> SyncError {
    SyncError::CatalogParse {
        message: message.into(),
    }
}
