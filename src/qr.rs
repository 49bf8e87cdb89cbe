use anyhow::{Result, anyhow};
use qrcode::QrCode;
use qrcode::render::svg;
use std::path::Path;

/// SVG-рендер QR-кода для otpauth:// URI — аутентификатор сканирует его
/// прямо с экрана.
pub fn uri_to_svg(uri: &str) -> Result<String> {
    let code = QrCode::new(uri.as_bytes()).map_err(|e| anyhow!("QR encode error: {e}"))?;
    Ok(code.render::<svg::Color>().build())
}

pub fn write_svg(uri: &str, path: &Path) -> Result<()> {
    let svg = uri_to_svg(uri)?;
    std::fs::write(path, svg)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_svg_for_provisioning_uri() {
        let svg = uri_to_svg("otpauth://totp/alice?secret=JBSWY3DPEHPK3PXP&issuer=MyApp").unwrap();
        assert!(svg.contains("<svg"));
    }
}
