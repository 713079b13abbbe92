use arrow::{
    array::{Array, AsArray},
    datatypes::{Float32Type, Float64Type},
};
use arrow_schema::DataType;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::{Error, Result};

/// Axis-aligned rectangle `(x0, y0, x1, y1)` with `x0 <= x1` and `y0 <= y1`.
///
/// The *empty* box has every coordinate set to NaN. It is the envelope of a
/// partition without coordinates and intersects every query, so an empty
/// partition is never pruned on the basis of missing information.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(serialize_with = "encode_coordinate", deserialize_with = "decode_coordinate")]
    pub x0: f64,
    #[serde(serialize_with = "encode_coordinate", deserialize_with = "decode_coordinate")]
    pub y0: f64,
    #[serde(serialize_with = "encode_coordinate", deserialize_with = "decode_coordinate")]
    pub x1: f64,
    #[serde(serialize_with = "encode_coordinate", deserialize_with = "decode_coordinate")]
    pub y1: f64,
}

impl BoundingBox {
    /// Creates a box from two corners given in any order.
    ///
    /// ```
    /// use geoparcel::BoundingBox;
    ///
    /// let bbox = BoundingBox::new(7.0, 4.0, 4.0, 7.0);
    /// assert_eq!(bbox, BoundingBox::new(4.0, 4.0, 7.0, 7.0));
    /// assert_eq!(bbox.x0, 4.0);
    /// ```
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        let (x0, x1) = if x0 > x1 { (x1, x0) } else { (x0, x1) };
        let (y0, y1) = if y0 > y1 { (y1, y0) } else { (y0, y1) };
        Self { x0, y0, x1, y1 }
    }

    pub fn empty() -> Self {
        Self {
            x0: f64::NAN,
            y0: f64::NAN,
            x1: f64::NAN,
            y1: f64::NAN,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x0.is_nan() || self.y0.is_nan() || self.x1.is_nan() || self.y1.is_nan()
    }

    /// Inclusive rectangle overlap; touching edges intersect.
    ///
    /// Comparisons against NaN are false, so the empty box intersects everything.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.x1 < other.x0 || self.y1 < other.y0 || self.x0 > other.x1 || self.y0 > other.y1)
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }

    /// Grows the box to cover the point `(x, y)`. NaN coordinates are ignored.
    pub fn expand_to(&mut self, x: f64, y: f64) {
        if x.is_nan() || y.is_nan() {
            return;
        }
        if self.is_empty() {
            *self = Self {
                x0: x,
                y0: y,
                x1: x,
                y1: y,
            };
            return;
        }
        self.x0 = self.x0.min(x);
        self.y0 = self.y0.min(y);
        self.x1 = self.x1.max(x);
        self.y1 = self.y1.max(y);
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut merged = *self;
        if !other.is_empty() {
            merged.expand_to(other.x0, other.y0);
            merged.expand_to(other.x1, other.y1);
        }
        merged
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x0, y0, x1, y1]: [f64; 4]) -> Self {
        Self::new(x0, y0, x1, y1)
    }
}

/// NaN is written as `null`; infinities as the strings `"Infinity"` and
/// `"-Infinity"`, which JSON numbers cannot express.
fn encode_coordinate<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    if value.is_nan() {
        serializer.serialize_none()
    } else if value.is_infinite() {
        serializer.serialize_str(if *value > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        serializer.serialize_f64(*value)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Number(f64),
    Named(String),
}

fn decode_coordinate<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    match Option::<Coordinate>::deserialize(deserializer)? {
        None => Ok(f64::NAN),
        Some(Coordinate::Number(value)) => Ok(value),
        Some(Coordinate::Named(name)) => match name.as_str() {
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            "NaN" => Ok(f64::NAN),
            other => Err(D::Error::custom(format!("invalid coordinate '{other}'"))),
        },
    }
}

/// Envelope of a geometry column.
///
/// Geometries are stored as (possibly nested) lists whose innermost values
/// are interleaved `x, y` coordinates. Null geometries contribute nothing.
pub fn envelope(array: &dyn Array) -> Result<BoundingBox> {
    let mut bbox = BoundingBox::empty();
    accumulate(array, &mut bbox)?;
    Ok(bbox)
}

fn accumulate(array: &dyn Array, bbox: &mut BoundingBox) -> Result<()> {
    match array.data_type() {
        DataType::List(_) => {
            let list = array.as_list::<i32>();
            for idx in 0..list.len() {
                if list.is_valid(idx) {
                    accumulate(list.value(idx).as_ref(), bbox)?;
                }
            }
        }
        DataType::LargeList(_) => {
            let list = array.as_list::<i64>();
            for idx in 0..list.len() {
                if list.is_valid(idx) {
                    accumulate(list.value(idx).as_ref(), bbox)?;
                }
            }
        }
        DataType::FixedSizeList(_, _) => {
            let list = array.as_fixed_size_list();
            for idx in 0..list.len() {
                if list.is_valid(idx) {
                    accumulate(list.value(idx).as_ref(), bbox)?;
                }
            }
        }
        DataType::Float64 => {
            let coords = array.as_primitive::<Float64Type>();
            accumulate_coords(coords.iter(), bbox);
        }
        DataType::Float32 => {
            let coords = array.as_primitive::<Float32Type>();
            accumulate_coords(coords.iter().map(|c| c.map(f64::from)), bbox);
        }
        other => {
            return Err(Error::schema(format!(
                "geometry coordinates must be nested lists of floats, found {other}"
            )));
        }
    }
    Ok(())
}

fn accumulate_coords(mut coords: impl Iterator<Item = Option<f64>>, bbox: &mut BoundingBox) {
    while let (Some(x), Some(y)) = (coords.next(), coords.next()) {
        if let (Some(x), Some(y)) = (x, y) {
            bbox.expand_to(x, y);
        }
    }
}
