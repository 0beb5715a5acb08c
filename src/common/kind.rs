use crate::common::error::MultilingualError;
use tch::{Kind, Scalar};

/// Smallest finite value representable by `kind`, used as additive attention mask.
pub(crate) fn get_min(kind: Kind) -> Result<Scalar, MultilingualError> {
    Ok(match kind {
        Kind::Uint8 => Scalar::int(u8::MIN.into()),
        Kind::Int8 => Scalar::int(i8::MIN.into()),
        Kind::Int16 => Scalar::int(i16::MIN.into()),
        Kind::Int => Scalar::int(i32::MIN.into()),
        Kind::Int64 => Scalar::int(i64::MIN),
        Kind::Half => Scalar::float(-65504.0),
        Kind::Float => Scalar::float(f32::MIN.into()),
        Kind::BFloat16 => Scalar::float(-3.3895313892515355e38),
        Kind::Double => Scalar::float(f64::MIN),
        _ => {
            return Err(MultilingualError::ValueError(format!(
                "Type not supported: attempted to get min for {:?}",
                kind
            )))
        }
    })
}
