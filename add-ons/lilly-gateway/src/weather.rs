//! Open-Meteo proxy: fixed city table, Arabic condition names.
//!
//! Unknown cities resolve to Riyadh's coordinates but keep the requested name
//! in the response so the client shows what it asked for.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

const CITY_COORDS: &[(&str, f64, f64)] = &[
    ("Riyadh", 24.7136, 46.6753),
    ("Jeddah", 21.4858, 39.1925),
    ("Dammam", 26.4207, 50.0888),
    ("Mecca", 21.3891, 39.8579),
    ("Medina", 24.5247, 39.5692),
];

pub const DEFAULT_CITY: &str = "Riyadh";

const OPEN_METEO_BASE: &str = "https://api.open-meteo.com";

/// Coordinates for a known city, or Riyadh's when the name is unrecognized.
pub fn coords_for(city: &str) -> (f64, f64) {
    CITY_COORDS
        .iter()
        .find(|(name, _, _)| *name == city)
        .or_else(|| CITY_COORDS.iter().find(|(name, _, _)| *name == DEFAULT_CITY))
        .map(|(_, lat, lon)| (*lat, *lon))
        .unwrap_or((24.7136, 46.6753))
}

/// WMO weather code to Arabic description. Unknown codes read as "طقس".
pub fn describe_code(code: i64) -> &'static str {
    match code {
        0 => "صحو",
        1 => "غائم جزئيًا",
        2 => "غائم",
        3 => "غائم كليًا",
        45 => "ضباب",
        48 => "ضباب متجمّد",
        51 => "رذاذ خفيف",
        53 => "رذاذ",
        55 => "رذاذ كثيف",
        61 => "أمطار خفيفة",
        63 => "أمطار",
        65 => "أمطار غزيرة",
        71 => "ثلوج خفيفة",
        73 => "ثلوج",
        75 => "ثلوج كثيفة",
        80 => "زخات خفيفة",
        81 => "زخات",
        82 => "زخات غزيرة",
        95 => "عواصف رعدية",
        96 => "عواصف مع برد",
        99 => "عواصف شديدة مع برد",
        _ => "طقس",
    }
}

#[derive(Deserialize)]
struct MeteoResponse {
    current: Option<MeteoCurrent>,
}

#[derive(Deserialize)]
struct MeteoCurrent {
    temperature_2m: Option<f64>,
    weather_code: Option<i64>,
}

/// Fetch the current conditions for `city`. Any failure, from DNS to a
/// malformed body, collapses to the quiet `{"text": "—"}` payload.
pub async fn current_conditions(client: &reqwest::Client, city: &str) -> Value {
    current_conditions_from(client, OPEN_METEO_BASE, city).await
}

async fn current_conditions_from(client: &reqwest::Client, base: &str, city: &str) -> Value {
    match fetch(client, base, city).await {
        Ok(payload) => payload,
        Err(err) => {
            warn!(target: "lilly::gateway", city, error = %err, "weather lookup failed");
            json!({ "text": "—" })
        }
    }
}

async fn fetch(
    client: &reqwest::Client,
    base: &str,
    city: &str,
) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
    let (lat, lon) = coords_for(city);
    let url = format!(
        "{}/v1/forecast?latitude={}&longitude={}&current=temperature_2m,weather_code&timezone=auto",
        base, lat, lon
    );
    let res = client.get(&url).send().await?;
    if !res.status().is_success() {
        return Err(format!("weather HTTP {}", res.status()).into());
    }
    let data: MeteoResponse = res.json().await?;
    let current = data.current.ok_or("missing current block")?;
    let temp = current.temperature_2m.ok_or("missing temperature")?;
    let desc = describe_code(current.weather_code.unwrap_or(-1));
    Ok(json!({ "city": city, "tempC": temp, "desc": desc }))
}
