//! Parameter string formats
//!
//! Besides the binary record sections, map files carry free-form text
//! blocks ("parameter strings"), each tagged with a numeric type. Two
//! conventions occur:
//!
//! - **Tab-coded**: a first value followed by tab-separated fields whose
//!   first character selects the meaning (`Purple\tn5\tc35\tm85`).
//!   Used for colors, templates and view settings.
//! - **Line-oriented**: one parameter per line, the first whitespace token
//!   selects the meaning (`scale 15000`). Used for georeferencing.

/// A parsed tab-coded parameter string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabCodedString {
    /// The value before the first tab
    pub value: String,
    /// Code character and payload of each following field
    pub fields: Vec<(char, String)>,
}

impl TabCodedString {
    pub fn parse(text: &str) -> Self {
        let mut parts = text.split('\t');
        let value = parts.next().unwrap_or("").to_string();
        let fields = parts
            .filter_map(|field| {
                let mut chars = field.chars();
                let code = chars.next()?;
                Some((code, chars.as_str().to_string()))
            })
            .collect();
        Self { value, fields }
    }

    /// Payload of the first field with the given code
    pub fn find(&self, code: char) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, data)| data.as_str())
    }

    /// Parsed payload of the first field with the given code
    pub fn find_parsed<T: std::str::FromStr>(&self, code: char) -> Option<T> {
        self.find(code).and_then(|data| data.parse().ok())
    }
}

/// Georeferencing parameters decoded from the line-oriented mini-format
///
/// All fields are optional; absent lines leave the map's defaults alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeorefParams {
    pub scale_denominator: Option<u32>,
    /// Declination in degrees
    pub declination: Option<f64>,
    /// Projected CRS id token and the remaining specification string
    pub crs: Option<(String, String)>,
    /// Map reference point in millimeters
    pub map_ref: Option<(f64, f64)>,
    /// Projected reference point
    pub projected_ref: Option<(f64, f64)>,
    /// Lines whose first token was not recognized
    pub unknown: Vec<String>,
}

impl GeorefParams {
    /// Parse the line-oriented georeferencing block.
    ///
    /// Each line starts with a keyword token: `scale`, `declination`,
    /// `crs <id> <proj spec...>`, `mapref <x> <y>`, `projref <x> <y>`.
    /// Malformed payloads and unknown keywords are collected in `unknown`
    /// for the importer to warn about.
    pub fn parse(text: &str) -> Self {
        let mut params = GeorefParams::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let keyword = tokens.next().unwrap_or("");
            let parsed = match keyword {
                "scale" => parse_one(&mut tokens)
                    .map(|v| params.scale_denominator = Some(v))
                    .is_some(),
                "declination" => parse_one(&mut tokens)
                    .map(|v| params.declination = Some(v))
                    .is_some(),
                "crs" => {
                    if let Some(id) = tokens.next() {
                        let spec = tokens.collect::<Vec<_>>().join(" ");
                        params.crs = Some((id.to_string(), spec));
                        true
                    } else {
                        false
                    }
                }
                "mapref" => parse_pair(&mut tokens)
                    .map(|v| params.map_ref = Some(v))
                    .is_some(),
                "projref" => parse_pair(&mut tokens)
                    .map(|v| params.projected_ref = Some(v))
                    .is_some(),
                _ => false,
            };
            if !parsed {
                params.unknown.push(line.to_string());
            }
        }
        params
    }
}

fn parse_one<'a, T: std::str::FromStr>(
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Option<T> {
    tokens.next().and_then(|t| t.parse().ok())
}

fn parse_pair<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<(f64, f64)> {
    let x = parse_one(tokens)?;
    let y = parse_one(tokens)?;
    Some((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_coded_parse() {
        let s = TabCodedString::parse("Purple\tn5\tc35\tm85\ty0\tk0\to1");
        assert_eq!(s.value, "Purple");
        assert_eq!(s.find('n'), Some("5"));
        assert_eq!(s.find_parsed::<f64>('c'), Some(35.0));
        assert_eq!(s.find_parsed::<u8>('o'), Some(1));
        assert_eq!(s.find('z'), None);
    }

    #[test]
    fn test_tab_coded_empty_fields() {
        let s = TabCodedString::parse("value\t\tx1");
        assert_eq!(s.value, "value");
        assert_eq!(s.find('x'), Some("1"));
    }

    #[test]
    fn test_georef_parse_full() {
        let text = "scale 15000\n\
                    declination 2.5\n\
                    crs EPSG:25832 +proj=utm +zone=32 +datum=WGS84 +units=m +no_defs\n\
                    mapref 12.5 -30.0\n\
                    projref 604800.5 5765001.25\n";
        let params = GeorefParams::parse(text);
        assert_eq!(params.scale_denominator, Some(15000));
        assert_eq!(params.declination, Some(2.5));
        let (id, spec) = params.crs.unwrap();
        assert_eq!(id, "EPSG:25832");
        assert_eq!(spec, "+proj=utm +zone=32 +datum=WGS84 +units=m +no_defs");
        assert_eq!(params.map_ref, Some((12.5, -30.0)));
        assert_eq!(params.projected_ref, Some((604800.5, 5765001.25)));
        assert!(params.unknown.is_empty());
    }

    #[test]
    fn test_georef_unknown_and_malformed_lines() {
        let params = GeorefParams::parse("scale nonsense\nfancy option\n\nscale 5000\n");
        assert_eq!(params.scale_denominator, Some(5000));
        assert_eq!(params.unknown, ["scale nonsense", "fancy option"]);
    }
}
