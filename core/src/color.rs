use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^#([0-9a-f]{3,8})$").expect("valid hex color regex"));

static FUNCTIONAL_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(rgba?|hsla?)\(\s*([^()]*?)\s*\)$").expect("valid functional color regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("Please enter a valid color, such as #000 or rgb(0,0,0)")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    /// Channels in `0..=255`.
    pub r: f64,
    pub g: f64,
    pub b: f64,
    /// Alpha in `0..=1`.
    pub a: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Hsla {
    h: f64,
    /// Saturation and lightness in `0..=100`.
    s: f64,
    l: f64,
    a: f64,
}

/// Darken by `amount` (0..1) of absolute lightness and return `#rrggbb`
/// (`#rrggbbaa` when translucent).
pub fn darken(input: &str, amount: f64) -> Result<String, ColorError> {
    let rgba = parse_color(input)?;
    let mut hsla = rgba_to_hsla(rgba);
    hsla.l = (hsla.l - amount * 100.0).clamp(0.0, 100.0);
    Ok(to_hex(hsla_to_rgba(hsla)))
}

/// Hex (`#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`), `rgb()`/`rgba()` or `hsl()`/`hsla()`.
pub fn parse_color(input: &str) -> Result<Rgba, ColorError> {
    let trimmed = input.trim();
    let invalid = || ColorError::Invalid(input.to_string());

    if let Some(captures) = HEX_COLOR.captures(trimmed) {
        return parse_hex(&captures[1]).ok_or_else(invalid);
    }

    let captures = FUNCTIONAL_COLOR.captures(trimmed).ok_or_else(invalid)?;
    let function = captures[1].to_ascii_lowercase();
    let parts: Vec<&str> = captures[2]
        .split(|ch: char| ch == ',' || ch == '/' || ch.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return Err(invalid());
    }
    let alpha = match parts.get(3) {
        Some(raw) => parse_alpha(raw).ok_or_else(invalid)?,
        None => 1.0,
    };

    if function.starts_with("rgb") {
        let r = parse_channel(parts[0]).ok_or_else(invalid)?;
        let g = parse_channel(parts[1]).ok_or_else(invalid)?;
        let b = parse_channel(parts[2]).ok_or_else(invalid)?;
        Ok(Rgba { r, g, b, a: alpha })
    } else {
        let h = parse_hue(parts[0]).ok_or_else(invalid)?;
        let s = parse_percent(parts[1]).ok_or_else(invalid)?;
        let l = parse_percent(parts[2]).ok_or_else(invalid)?;
        Ok(hsla_to_rgba(Hsla { h, s, l, a: alpha }))
    }
}

fn parse_hex(digits: &str) -> Option<Rgba> {
    let expanded: String = match digits.len() {
        3 | 4 => digits.chars().flat_map(|ch| [ch, ch]).collect(),
        6 | 8 => digits.to_string(),
        _ => return None,
    };
    let byte = |index: usize| u8::from_str_radix(&expanded[index..index + 2], 16).ok();
    let a = if expanded.len() == 8 {
        // Alpha keeps two decimals, which is what the hex round trip expects.
        (f64::from(byte(6)?) / 255.0 * 100.0).round() / 100.0
    } else {
        1.0
    };
    Some(Rgba {
        r: f64::from(byte(0)?),
        g: f64::from(byte(2)?),
        b: f64::from(byte(4)?),
        a,
    })
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_channel(raw: &str) -> Option<f64> {
    let value = match raw.strip_suffix('%') {
        Some(percent) => parse_number(percent)? * 2.55,
        None => parse_number(raw)?,
    };
    Some(value.clamp(0.0, 255.0))
}

fn parse_alpha(raw: &str) -> Option<f64> {
    let value = match raw.strip_suffix('%') {
        Some(percent) => parse_number(percent)? / 100.0,
        None => parse_number(raw)?,
    };
    Some(value.clamp(0.0, 1.0))
}

fn parse_percent(raw: &str) -> Option<f64> {
    let number = raw.strip_suffix('%').unwrap_or(raw);
    Some(parse_number(number)?.clamp(0.0, 100.0))
}

fn parse_hue(raw: &str) -> Option<f64> {
    let number = raw.strip_suffix("deg").unwrap_or(raw);
    Some(parse_number(number)?.rem_euclid(360.0))
}

fn rgba_to_hsla(Rgba { r, g, b, a }: Rgba) -> Hsla {
    let (r, g, b) = (r / 255.0, g / 255.0, b / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let l = (max + min) / 2.0;

    let s = if delta == 0.0 {
        0.0
    } else {
        delta / (1.0 - (2.0 * l - 1.0).abs())
    };
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    Hsla {
        h,
        s: s * 100.0,
        l: l * 100.0,
        a,
    }
}

fn hsla_to_rgba(Hsla { h, s, l, a }: Hsla) -> Rgba {
    let s = s / 100.0;
    let l = l / 100.0;
    let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let sector = h / 60.0;
    let x = chroma * (1.0 - (sector.rem_euclid(2.0) - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = l - chroma / 2.0;
    Rgba {
        r: (r + m) * 255.0,
        g: (g + m) * 255.0,
        b: (b + m) * 255.0,
        a,
    }
}

fn to_hex(Rgba { r, g, b, a }: Rgba) -> String {
    let channel = |value: f64| value.round().clamp(0.0, 255.0) as u8;
    let mut hex = format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b));
    if a < 1.0 {
        hex.push_str(&format!("{:02x}", channel(a * 255.0)));
    }
    hex
}
