//! Place search command.

use console::style;

use geoenrich::config::Settings;
use geoenrich::geocode::NominatimGeocoder;
use geoenrich::http_client::HttpClient;

/// Print `(city, country)` candidates for a query.
pub async fn cmd_places(settings: &Settings, query: &str) -> anyhow::Result<()> {
    let http = HttpClient::from_settings(&settings.http)?;
    let geocoder = NominatimGeocoder::new(http, &settings.geocoder.endpoint);
    let places = geocoder.search_places(query).await?;

    if places.is_empty() {
        println!("{} No places match '{}'", style("!").yellow(), query);
        return Ok(());
    }

    for place in places {
        println!(
            "  {} {} {}",
            style("→").dim(),
            style(&place.city).bold(),
            style(format!("({})", place.country)).dim()
        );
    }
    Ok(())
}
