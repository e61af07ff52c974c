use anyhow::Context;

pub type EpsgCode = u32;

pub fn epsg_code_to_authority_string(code: EpsgCode) -> String {
    format!("EPSG:{}", code)
}

/// Normalize a user supplied CRS label.
///
/// A bare EPSG code ("4326") and any casing of the authority prefix ("epsg:4326") become
/// "EPSG:4326". Anything else (WKT, PROJ strings, other authorities) is returned trimmed.
pub fn normalize_crs_label(label: &str) -> String {
    let label = label.trim();
    if let Ok(code) = label.parse::<EpsgCode>() {
        return epsg_code_to_authority_string(code);
    }
    if let Some((authority, code)) = label.split_once(':') {
        if authority.eq_ignore_ascii_case("EPSG") {
            if let Ok(code) = code.trim().parse::<EpsgCode>() {
                return epsg_code_to_authority_string(code);
            }
        }
    }
    label.to_owned()
}

/// Build a spatial reference from a CRS label. This only interprets the label, no coordinates are
/// transformed.
pub fn spatial_ref_from_label(label: &str) -> anyhow::Result<gdal::spatial_ref::SpatialRef> {
    let label = normalize_crs_label(label);
    gdal::spatial_ref::SpatialRef::from_definition(&label)
        .with_context(|| format!("Could not interpret CRS '{}'", label))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::normalize_crs_label;

    #[rstest]
    #[case("4326", "EPSG:4326")]
    #[case("EPSG:4326", "EPSG:4326")]
    #[case("epsg:3857", "EPSG:3857")]
    #[case(" EPSG: 32654 ", "EPSG:32654")]
    #[case("ESRI:102100", "ESRI:102100")]
    #[case("+proj=longlat +datum=WGS84", "+proj=longlat +datum=WGS84")]
    fn test_normalize_crs_label(#[case] label: &str, #[case] expected: &str) {
        assert_eq!(normalize_crs_label(label), expected);
    }
}
