// pgvector query parameter for sqlx, sent in pgvector's binary wire format.
// Only encoding is needed: searches return similarity scores, never vectors.

use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo};
use sqlx::{Encode, Postgres, Type};

#[derive(Debug, Clone, PartialEq)]
pub struct PgVector(pub Vec<f32>);

impl PgVector {
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// Binary layout: u16 dimension count, u16 unused, then big-endian f32 values
    pub fn to_binary(&self) -> Result<Vec<u8>, String> {
        let dim = u16::try_from(self.0.len())
            .map_err(|_| format!("vector has {} dimensions, pgvector allows at most {}", self.0.len(), u16::MAX))?;

        if let Some(pos) = self.0.iter().position(|v| !v.is_finite()) {
            return Err(format!("vector component {} is not finite", pos));
        }

        let mut out = Vec::with_capacity(4 + self.0.len() * 4);
        out.extend_from_slice(&dim.to_be_bytes());
        out.extend_from_slice(&[0u8, 0u8]);
        for value in &self.0 {
            out.extend_from_slice(&value.to_be_bytes());
        }
        Ok(out)
    }
}

impl From<Vec<f32>> for PgVector {
    fn from(vec: Vec<f32>) -> Self {
        Self(vec)
    }
}

impl From<&[f32]> for PgVector {
    fn from(slice: &[f32]) -> Self {
        Self(slice.to_vec())
    }
}

impl Type<Postgres> for PgVector {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("vector")
    }
}

impl Encode<'_, Postgres> for PgVector {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        let bytes = self.to_binary()?;
        buf.extend_from_slice(&bytes);
        Ok(IsNull::No)
    }
}
