//! Download URL composition

/// Image CDN used when no template is configured
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://img.rarible.com/prod/image/upload/t_image_big/prod-itemImages/{contract}:{id}";

/// Expand `{contract}` and `{id}` placeholders in `template`
pub fn compose_url(template: &str, contract: &str, id: u64) -> String {
    template
        .replace("{contract}", contract)
        .replace("{id}", &id.to_string())
}
