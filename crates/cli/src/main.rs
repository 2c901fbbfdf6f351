mod surface;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use propmap_engine::{
    Coordinates, EngineConfig, GraphqlBackend, MapEngine, RedbStore, SelectOutcome, SelectRequest,
    SystemClock,
};
use propmap_shared::viewport::ScreenSize;

use surface::HeadlessSurface;

const USAGE: &str = "usage: propmap-cli <entity-id | --address TEXT> [--at LAT,LNG] [--navigate]";

/// Parse the command line (without the program name) into a select request.
fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<SelectRequest, String> {
    let mut args = args.into_iter();
    let mut id: Option<String> = None;
    let mut address: Option<String> = None;
    let mut at: Option<Coordinates> = None;
    let mut navigate = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--address" => {
                let text = args.next().ok_or("--address needs a value")?;
                address = Some(text);
            }
            "--at" => {
                let raw = args.next().ok_or("--at needs LAT,LNG")?;
                at = Some(parse_coordinates(&raw)?);
            }
            "--navigate" => navigate = true,
            flag if flag.starts_with("--") => return Err(format!("unknown option {}", flag)),
            _ if id.is_none() => id = Some(arg.clone()),
            _ => return Err(format!("unexpected argument {}", arg)),
        }
    }

    let mut request = match (id, address) {
        (Some(id), None) => SelectRequest::id(id),
        (None, Some(address)) => SelectRequest::address(address),
        (Some(_), Some(_)) => return Err("give an entity id or --address, not both".to_string()),
        (None, None) => return Err("nothing to select".to_string()),
    };
    if let Some(coordinates) = at {
        request = request.with_coordinates(coordinates);
    }
    if navigate {
        request = request.navigation_only();
    }
    Ok(request)
}

fn parse_coordinates(raw: &str) -> Result<Coordinates, String> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG, got {}", raw))?;
    let lat: f64 = lat.trim().parse().map_err(|_| format!("bad latitude {}", lat))?;
    let lng: f64 = lng.trim().parse().map_err(|_| format!("bad longitude {}", lng))?;
    let coordinates = Coordinates::new(lat, lng);
    if !coordinates.is_valid() {
        return Err(format!("coordinates out of range: {}", raw));
    }
    Ok(coordinates)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let request = match parse_args(std::env::args().skip(1)) {
        Ok(request) => request,
        Err(msg) => {
            eprintln!("{}\n{}", msg, USAGE);
            return ExitCode::from(2);
        }
    };

    let api_url = std::env::var("PROPMAP_API_URL")
        .unwrap_or_else(|_| "http://localhost:3000/graphql".to_string());
    let cache_path = PathBuf::from(
        std::env::var("PROPMAP_CACHE_PATH")
            .unwrap_or_else(|_| "data/propmap-cache.redb".to_string()),
    );
    if let Some(parent) = cache_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::error!(path = %parent.display(), error = %e, "failed to create cache directory");
            return ExitCode::FAILURE;
        }
    }
    let store = match RedbStore::open(&cache_path) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(path = %cache_path.display(), error = %e, "failed to open cache");
            return ExitCode::FAILURE;
        }
    };

    let surface = HeadlessSurface::new(
        ScreenSize {
            width: 1280.0,
            height: 800.0,
        },
        12.0,
    );
    let engine = MapEngine::new(
        Arc::new(GraphqlBackend::new(api_url)),
        Arc::new(surface),
        Arc::new(store),
        Arc::new(SystemClock),
        EngineConfig::from_env(),
    );

    let records = engine.load_entities().await;
    tracing::info!(count = records.len(), "entities loaded");

    let outcome = engine.select_entity(request).await;
    println!("{:?} -> {}", outcome, engine.state());

    match outcome {
        SelectOutcome::Shown(_) | SelectOutcome::Navigated(_) | SelectOutcome::AlreadySelected => {
            ExitCode::SUCCESS
        }
        _ => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propmap_engine::EntityRef;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_entity_id() {
        let request = parse_args(args(&["42"])).unwrap();
        assert_eq!(request.target, EntityRef::Id("42".to_string()));
        assert!(!request.navigation_only);
        assert!(request.coordinates.is_none());
    }

    #[test]
    fn test_parse_address_with_flags() {
        let request = parse_args(args(&["--address", "12 Harbour Side", "--at", "51.45,-2.59", "--navigate"])).unwrap();
        assert_eq!(request.target, EntityRef::Address("12 Harbour Side".to_string()));
        assert_eq!(request.coordinates, Some(Coordinates::new(51.45, -2.59)));
        assert!(request.navigation_only);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["1", "2"])).is_err());
        assert!(parse_args(args(&["1", "--address", "x"])).is_err());
        assert!(parse_args(args(&["--address"])).is_err());
        assert!(parse_args(args(&["1", "--zoom"])).is_err());
        assert!(parse_args(args(&["1", "--at", "95,0"])).is_err());
        assert!(parse_args(args(&["1", "--at", "north"])).is_err());
    }
}
