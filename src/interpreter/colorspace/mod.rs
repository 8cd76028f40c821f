//! Colour spaces
//!
//! A colour space is a name (`/DeviceRGB`) or an array whose first element
//! names its family. Separation and DeviceN spaces carry an alternate space
//! and a tint transform; Indexed spaces carry a base space and a lookup.
//! Resolving a colour walks these layers from the outermost inwards, and any
//! layer whose transform is a PostScript procedure has to suspend onto the
//! exec stack. The walking itself lives in `ops`.

use crate::interpreter::errors::PsError;
use crate::interpreter::types::{Obj, Value};

pub mod function;
pub mod ops;

/// Largest `hival` an Indexed space may carry
pub const MAX_HIVAL: i64 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
    Separation,
    DeviceN,
    Indexed,
}

impl Family {
    pub fn from_name(name: &str) -> Option<Family> {
        match name {
            "DeviceGray" => Some(Family::DeviceGray),
            "DeviceRGB" => Some(Family::DeviceRGB),
            "DeviceCMYK" => Some(Family::DeviceCMYK),
            "Separation" => Some(Family::Separation),
            "DeviceN" => Some(Family::DeviceN),
            "Indexed" => Some(Family::Indexed),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Family::DeviceGray => "DeviceGray",
            Family::DeviceRGB => "DeviceRGB",
            Family::DeviceCMYK => "DeviceCMYK",
            Family::Separation => "Separation",
            Family::DeviceN => "DeviceN",
            Family::Indexed => "Indexed",
        }
    }

    /// Family of a space given as a name or as an array led by one
    pub fn of(space: &Obj) -> Result<Family, PsError> {
        let name = match &space.value {
            Value::Name(n) => n.to_string(),
            Value::Array(arr) => arr.get(0).ok_or(PsError::RangeCheck)?.as_name_text()?,
            _ => return Err(PsError::TypeCheck),
        };
        Family::from_name(&name).ok_or(PsError::Undefined(name))
    }

    pub fn is_device(self) -> bool {
        matches!(
            self,
            Family::DeviceGray | Family::DeviceRGB | Family::DeviceCMYK
        )
    }
}

/// The device spaces a colour can be reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseColor {
    Gray,
    Rgb,
    Cmyk,
}

impl BaseColor {
    pub fn components(self) -> usize {
        match self {
            BaseColor::Gray => 1,
            BaseColor::Rgb => 3,
            BaseColor::Cmyk => 4,
        }
    }

    pub fn family(self) -> Family {
        match self {
            BaseColor::Gray => Family::DeviceGray,
            BaseColor::Rgb => Family::DeviceRGB,
            BaseColor::Cmyk => Family::DeviceCMYK,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            BaseColor::Gray => 0,
            BaseColor::Rgb => 1,
            BaseColor::Cmyk => 2,
        }
    }

    pub fn from_code(code: i64) -> Result<BaseColor, PsError> {
        match code {
            0 => Ok(BaseColor::Gray),
            1 => Ok(BaseColor::Rgb),
            2 => Ok(BaseColor::Cmyk),
            _ => Err(PsError::Unknown(format!("bad base colour code {}", code))),
        }
    }
}

/// Colour state consulted and updated by the colour operators
#[derive(Debug, Clone, PartialEq)]
pub struct GState {
    pub color_space: Obj,
    pub color: Vec<f64>,
    /// Sampled lookup of the current Indexed space, `(hival + 1) * n` values
    pub indexed_table: Option<Vec<f64>>,
}

impl Default for GState {
    fn default() -> Self {
        GState {
            color_space: Obj::name("DeviceGray"),
            color: vec![0.0],
            indexed_table: None,
        }
    }
}

/* ===================== Space Structure ===================== */

/// Element `index` of a colour space array
pub fn element(space: &Obj, index: usize) -> Result<Obj, PsError> {
    space
        .as_array()?
        .get(index)
        .ok_or(PsError::RangeCheck)
}

fn space_len(space: &Obj) -> usize {
    match &space.value {
        Value::Array(arr) => arr.len(),
        _ => 1,
    }
}

/// Colorant names of a Separation or DeviceN space
pub fn colorant_names(space: &Obj) -> Result<Vec<String>, PsError> {
    match Family::of(space)? {
        Family::Separation => Ok(vec![element(space, 1)?.as_name_text()?]),
        Family::DeviceN => element(space, 1)?
            .as_array()?
            .to_vec()
            .iter()
            .map(Obj::as_name_text)
            .collect(),
        _ => Err(PsError::TypeCheck),
    }
}

/// Number of colour operands a space takes
pub fn components(space: &Obj) -> Result<usize, PsError> {
    Ok(match Family::of(space)? {
        Family::DeviceGray | Family::Separation | Family::Indexed => 1,
        Family::DeviceRGB => 3,
        Family::DeviceCMYK => 4,
        Family::DeviceN => colorant_names(space)?.len(),
    })
}

/// The next layer down: a Separation or DeviceN alternate, an Indexed base
pub fn alternate(space: &Obj) -> Result<Option<Obj>, PsError> {
    Ok(match Family::of(space)? {
        Family::Separation | Family::DeviceN => Some(element(space, 2)?),
        Family::Indexed => Some(element(space, 1)?),
        _ => None,
    })
}

/// Layer `index` of a space, counting the space itself as layer 0
pub fn layer(space: &Obj, index: usize) -> Result<Obj, PsError> {
    let mut current = space.clone();
    for _ in 0..index {
        current = alternate(&current)?.ok_or(PsError::RangeCheck)?;
    }
    Ok(current)
}

pub fn hival(space: &Obj) -> Result<i64, PsError> {
    element(space, 2)?.as_int()
}

/* ===================== Validation ===================== */

fn check_tint_transform(tint: &Obj) -> Result<(), PsError> {
    match tint.value {
        Value::Function(_) => Ok(()),
        _ if tint.is_proc() => Ok(()),
        _ => Err(PsError::TypeCheck),
    }
}

fn validate_layer(space: &Obj) -> Result<Family, PsError> {
    let family = Family::of(space)?;
    match family {
        Family::DeviceGray | Family::DeviceRGB | Family::DeviceCMYK => {
            if space_len(space) != 1 {
                return Err(PsError::RangeCheck);
            }
        }
        Family::Separation | Family::DeviceN => {
            if space_len(space) != 4 {
                return Err(PsError::RangeCheck);
            }
            let names = colorant_names(space)?;
            if names.is_empty() {
                return Err(PsError::RangeCheck);
            }
            let alt = element(space, 2)?;
            if !Family::of(&alt)?.is_device() {
                return Err(PsError::TypeCheck);
            }
            check_tint_transform(&element(space, 3)?)?;
        }
        Family::Indexed => {
            if space_len(space) != 4 {
                return Err(PsError::RangeCheck);
            }
            let base = element(space, 1)?;
            if Family::of(&base)? == Family::Indexed {
                return Err(PsError::RangeCheck);
            }
            let hival = hival(space)?;
            if !(0..=MAX_HIVAL).contains(&hival) {
                return Err(PsError::RangeCheck);
            }
            let lookup = element(space, 3)?;
            match &lookup.value {
                Value::Str(bytes) => {
                    let needed = (hival as usize + 1) * components(&base)?;
                    if bytes.len() < needed {
                        return Err(PsError::RangeCheck);
                    }
                }
                _ if lookup.is_proc() => {}
                _ => return Err(PsError::TypeCheck),
            }
        }
    }
    Ok(family)
}

/// Check every layer of a space and return how many layers it has
pub fn validate_spaces(space: &Obj) -> Result<usize, PsError> {
    let mut depth = 0;
    let mut current = space.clone();
    loop {
        validate_layer(&current)?;
        depth += 1;
        match alternate(&current)? {
            Some(next) => current = next,
            None => return Ok(depth),
        }
    }
}

/// Colour a space starts out with after `setcolorspace`
pub fn initial_color(space: &Obj) -> Result<Vec<f64>, PsError> {
    Ok(match Family::of(space)? {
        Family::DeviceGray | Family::Indexed => vec![0.0],
        Family::DeviceRGB => vec![0.0; 3],
        Family::DeviceCMYK => vec![0.0, 0.0, 0.0, 1.0],
        Family::Separation | Family::DeviceN => vec![1.0; components(space)?],
    })
}

/// Decode a string lookup into component values in `[0, 1]`
pub fn decode_lookup(bytes: &[u8], entries: usize, ncomps: usize) -> Result<Vec<f64>, PsError> {
    let needed = entries * ncomps;
    let table = bytes.get(..needed).ok_or(PsError::RangeCheck)?;
    Ok(table.iter().map(|b| f64::from(*b) / 255.0).collect())
}

/* ===================== Device Conversion ===================== */

fn rgb_to_gray(r: f64, g: f64, b: f64) -> f64 {
    0.3 * r + 0.59 * g + 0.11 * b
}

/// Convert device components between device spaces
pub fn convert(from: Family, comps: &[f64], to: BaseColor) -> Result<Vec<f64>, PsError> {
    Ok(match (from, comps, to) {
        (Family::DeviceGray, [g], BaseColor::Gray) => vec![*g],
        (Family::DeviceGray, [g], BaseColor::Rgb) => vec![*g, *g, *g],
        (Family::DeviceGray, [g], BaseColor::Cmyk) => vec![0.0, 0.0, 0.0, 1.0 - g],
        (Family::DeviceRGB, [r, g, b], BaseColor::Gray) => vec![rgb_to_gray(*r, *g, *b)],
        (Family::DeviceRGB, [r, g, b], BaseColor::Rgb) => vec![*r, *g, *b],
        (Family::DeviceRGB, [r, g, b], BaseColor::Cmyk) => {
            let (c, m, y) = (1.0 - r, 1.0 - g, 1.0 - b);
            // Full undercolour removal
            let k = c.min(m).min(y);
            vec![c - k, m - k, y - k, k]
        }
        (Family::DeviceCMYK, [c, m, y, k], BaseColor::Gray) => {
            vec![1.0 - (rgb_to_gray(*c, *m, *y) + k).min(1.0)]
        }
        (Family::DeviceCMYK, [c, m, y, k], BaseColor::Rgb) => vec![
            1.0 - (c + k).min(1.0),
            1.0 - (m + k).min(1.0),
            1.0 - (y + k).min(1.0),
        ],
        (Family::DeviceCMYK, [c, m, y, k], BaseColor::Cmyk) => vec![*c, *m, *y, *k],
        _ => return Err(PsError::TypeCheck),
    })
}
