// json_loader.rs — compile-time embedded engine assets.
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset '{0}' not embedded. Add it to json_loader.rs asset() to embed at compile time.")]
    Unknown(String),
    #[error("parse error in {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

// include_str! requires compile-time paths; all assets must be listed here.
fn asset(name: &str) -> Result<&'static str, AssetError> {
    match name {
        "rig.json"        => Ok(include_str!("../assets/rig.json")),
        "handshapes.json" => Ok(include_str!("../assets/handshapes.json")),
        "locations.json"  => Ok(include_str!("../assets/locations.json")),
        _ => Err(AssetError::Unknown(name.to_string())),
    }
}

pub fn load<T: for<'de> Deserialize<'de>>(name: &str) -> Result<T, AssetError> {
    serde_json::from_str(asset(name)?).map_err(|e| AssetError::Parse { name: name.to_string(), source: e })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_asset_is_an_error() {
        let r: Result<serde_json::Value, _> = load("nope.json");
        assert!(r.is_err());
    }

    #[test]
    fn embedded_assets_parse() {
        for name in ["rig.json", "handshapes.json", "locations.json"] {
            let v: serde_json::Value = load(name).unwrap();
            assert!(v.is_object(), "{name} should parse to an object");
        }
    }
}
