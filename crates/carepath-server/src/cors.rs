use carepath_config::{AllowedOrigins, CorsConfig};
use http::{HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

/// Build a Tower CORS layer from configuration
///
/// Unparseable origins and methods are skipped; `validate()` has already
/// rejected a bad `max_age`.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let mut layer = CorsLayer::new().allow_headers(AllowHeaders::mirror_request());

    layer = match &config.origins {
        AllowedOrigins::Any => layer.allow_origin(AllowOrigin::any()),
        AllowedOrigins::List(origins) => {
            let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            layer.allow_origin(origins)
        }
    };

    let methods: Vec<Method> = config.methods.iter().filter_map(|m| m.parse().ok()).collect();
    layer = layer.allow_methods(methods);

    if config.credentials {
        layer = layer.allow_credentials(true);
    }

    if let Ok(Some(max_age)) = config.max_age() {
        layer = layer.max_age(max_age);
    }

    layer
}
