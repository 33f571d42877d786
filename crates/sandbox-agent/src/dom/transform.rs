//! CSS `transform` values to affine matrices.

use kurbo::{Affine, Vec2};
use thiserror::Error;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformParseError {
    #[error("unsupported transform function {0}")]
    UnknownFunction(String),
    #[error("bad arguments for {function}: {reason}")]
    BadArguments { function: String, reason: String },
    #[error("unterminated transform function {0}")]
    Unterminated(String),
}

/// Parses a transform list such as `translate(10px, 4px) rotate(45deg)`.
/// Functions compose left to right, as in CSS. `none` and the empty string
/// are the identity.
pub fn parse_transform(value: &str) -> Result<Affine, TransformParseError> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(Affine::IDENTITY);
    }

    let mut result = Affine::IDENTITY;
    let mut rest = value;
    while !rest.trim_start().is_empty() {
        rest = rest.trim_start();
        let open = rest
            .find('(')
            .ok_or_else(|| TransformParseError::UnknownFunction(rest.to_string()))?;
        let name = rest[..open].trim().to_ascii_lowercase();
        let close = rest[open..]
            .find(')')
            .map(|offset| open + offset)
            .ok_or_else(|| TransformParseError::Unterminated(name.clone()))?;
        let args: Vec<&str> = rest[open + 1..close]
            .split(',')
            .map(str::trim)
            .filter(|arg| !arg.is_empty())
            .collect();
        result = result * function_matrix(&name, &args)?;
        rest = &rest[close + 1..];
    }
    Ok(result)
}

pub fn is_identity(affine: Affine) -> bool {
    affine
        .as_coeffs()
        .iter()
        .zip(Affine::IDENTITY.as_coeffs())
        .all(|(a, b)| (a - b).abs() < EPSILON)
}

/// Serializes a matrix the way a computed style reports it.
pub fn format_matrix(affine: Affine) -> String {
    let [a, b, c, d, e, f] = affine.as_coeffs();
    format!("matrix({a}, {b}, {c}, {d}, {e}, {f})")
}

fn function_matrix(name: &str, args: &[&str]) -> Result<Affine, TransformParseError> {
    let bad = |reason: &str| TransformParseError::BadArguments {
        function: name.to_string(),
        reason: reason.to_string(),
    };
    match name {
        "translate" => match args {
            [x] => Ok(Affine::translate(Vec2::new(length(x).ok_or_else(|| bad("length"))?, 0.0))),
            [x, y] => Ok(Affine::translate(Vec2::new(
                length(x).ok_or_else(|| bad("length"))?,
                length(y).ok_or_else(|| bad("length"))?,
            ))),
            _ => Err(bad("expected one or two lengths")),
        },
        "translatex" => match args {
            [x] => Ok(Affine::translate(Vec2::new(length(x).ok_or_else(|| bad("length"))?, 0.0))),
            _ => Err(bad("expected one length")),
        },
        "translatey" => match args {
            [y] => Ok(Affine::translate(Vec2::new(0.0, length(y).ok_or_else(|| bad("length"))?))),
            _ => Err(bad("expected one length")),
        },
        "scale" => match args {
            [s] => {
                let s = number(s).ok_or_else(|| bad("number"))?;
                Ok(Affine::scale(s))
            }
            [sx, sy] => Ok(Affine::scale_non_uniform(
                number(sx).ok_or_else(|| bad("number"))?,
                number(sy).ok_or_else(|| bad("number"))?,
            )),
            _ => Err(bad("expected one or two numbers")),
        },
        "scalex" => match args {
            [s] => Ok(Affine::scale_non_uniform(number(s).ok_or_else(|| bad("number"))?, 1.0)),
            _ => Err(bad("expected one number")),
        },
        "scaley" => match args {
            [s] => Ok(Affine::scale_non_uniform(1.0, number(s).ok_or_else(|| bad("number"))?)),
            _ => Err(bad("expected one number")),
        },
        "rotate" => match args {
            [angle_arg] => Ok(Affine::rotate(angle(angle_arg).ok_or_else(|| bad("angle"))?)),
            _ => Err(bad("expected one angle")),
        },
        "matrix" => {
            if args.len() != 6 {
                return Err(bad("expected six numbers"));
            }
            let mut coeffs = [0.0; 6];
            for (slot, arg) in coeffs.iter_mut().zip(args) {
                *slot = number(arg).ok_or_else(|| bad("number"))?;
            }
            Ok(Affine::new(coeffs))
        }
        other => Err(TransformParseError::UnknownFunction(other.to_string())),
    }
}

fn number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn length(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match raw.strip_suffix("px") {
        Some(value) => number(value),
        // Unitless lengths are only valid for zero.
        None => number(raw).filter(|n| *n == 0.0),
    }
}

fn angle(raw: &str) -> Option<f64> {
    let raw = raw.trim().to_ascii_lowercase();
    if let Some(value) = raw.strip_suffix("deg") {
        return number(value).map(f64::to_radians);
    }
    if let Some(value) = raw.strip_suffix("grad") {
        return number(value).map(|g| g * std::f64::consts::PI / 200.0);
    }
    if let Some(value) = raw.strip_suffix("rad") {
        return number(value);
    }
    if let Some(value) = raw.strip_suffix("turn") {
        return number(value).map(|t| t * std::f64::consts::TAU);
    }
    number(&raw).filter(|n| *n == 0.0)
}
