//! Temporal value encoding
//!
//! Every temporal value flattens to a short list of i64 fields:
//!
//! | subtype | kind           | fields                               |
//! |---------|----------------|--------------------------------------|
//! | 1       | date           | epoch day                            |
//! | 2       | local time     | nano of day                          |
//! | 3       | local datetime | epoch second, nano                   |
//! | 4       | time           | nano of day, offset seconds          |
//! | 5       | datetime       | epoch second, nano, offset seconds   |
//! | 6       | duration       | months, days, seconds, nanos         |
//!
//! In property blocks the subtype sits at bit 28. Single-field kinds store
//! the field inline at bit 33 (flagged by bit 32) when it fits 31 signed
//! bits, else in a second block. Multi-field kinds keep their last field,
//! which always fits 32 bits, in bits 32..63 and the rest one block each.

use super::types::{self, PAYLOAD_SHIFT, PropertyType};
use super::value::TemporalValue;
use crate::{Error, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Timelike};

const NANOS_PER_SECOND: i64 = 1_000_000_000;
/// `NaiveDate::num_days_from_ce` of 1970-01-01
const UNIX_EPOCH_DAY_FROM_CE: i64 = 719_163;

const INLINE_FLAG: u64 = 1 << 32;
const INLINE_SHIFT: u32 = 33;
const INLINE_MIN: i64 = -(1 << 30);
const INLINE_MAX: i64 = (1 << 30) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subtype {
    Date = 1,
    LocalTime = 2,
    LocalDateTime = 3,
    Time = 4,
    DateTime = 5,
    Duration = 6,
}

impl Subtype {
    fn from_code(code: u64) -> Result<Self> {
        Ok(match code {
            1 => Self::Date,
            2 => Self::LocalTime,
            3 => Self::LocalDateTime,
            4 => Self::Time,
            5 => Self::DateTime,
            6 => Self::Duration,
            other => {
                return Err(Error::codec(format!("Unknown temporal subtype {}", other)));
            }
        })
    }

    fn field_count(self) -> usize {
        match self {
            Self::Date | Self::LocalTime => 1,
            Self::LocalDateTime | Self::Time => 2,
            Self::DateTime => 3,
            Self::Duration => 4,
        }
    }
}

fn nano_of_day(time: &NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * NANOS_PER_SECOND + time.nanosecond() as i64
}

fn time_from_nanos(nanos: i64) -> Result<NaiveTime> {
    let secs = u32::try_from(nanos.div_euclid(NANOS_PER_SECOND)).ok();
    let frac = nanos.rem_euclid(NANOS_PER_SECOND) as u32;
    secs.and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, frac))
        .ok_or_else(|| Error::codec(format!("invalid nano of day {}", nanos)))
}

fn offset_from(seconds: i64) -> Result<FixedOffset> {
    i32::try_from(seconds)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| Error::codec(format!("invalid UTC offset {}", seconds)))
}

fn fields(value: &TemporalValue) -> (Subtype, Vec<i64>) {
    match value {
        TemporalValue::Date(date) => (
            Subtype::Date,
            vec![date.num_days_from_ce() as i64 - UNIX_EPOCH_DAY_FROM_CE],
        ),
        TemporalValue::LocalTime(time) => (Subtype::LocalTime, vec![nano_of_day(time)]),
        TemporalValue::LocalDateTime(dt) => {
            let utc = dt.and_utc();
            (
                Subtype::LocalDateTime,
                vec![utc.timestamp(), utc.timestamp_subsec_nanos() as i64],
            )
        }
        TemporalValue::Time {
            time,
            offset_seconds,
        } => (
            Subtype::Time,
            vec![nano_of_day(time), *offset_seconds as i64],
        ),
        TemporalValue::DateTime(dt) => (
            Subtype::DateTime,
            vec![
                dt.timestamp(),
                dt.timestamp_subsec_nanos() as i64,
                dt.offset().local_minus_utc() as i64,
            ],
        ),
        TemporalValue::Duration {
            months,
            days,
            seconds,
            nanos,
        } => (
            Subtype::Duration,
            vec![*months, *days, *seconds, *nanos as i64],
        ),
    }
}

fn from_fields(subtype: Subtype, f: &[i64]) -> Result<TemporalValue> {
    if f.len() != subtype.field_count() {
        return Err(Error::codec(format!(
            "{:?} needs {} fields, got {}",
            subtype,
            subtype.field_count(),
            f.len()
        )));
    }
    let timestamp = |secs: i64, nanos: i64| {
        u32::try_from(nanos)
            .ok()
            .and_then(|n| DateTime::from_timestamp(secs, n))
            .ok_or_else(|| Error::codec(format!("invalid timestamp {}.{}", secs, nanos)))
    };
    Ok(match subtype {
        Subtype::Date => {
            let date = i32::try_from(f[0] + UNIX_EPOCH_DAY_FROM_CE)
                .ok()
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .ok_or_else(|| Error::codec(format!("invalid epoch day {}", f[0])))?;
            TemporalValue::Date(date)
        }
        Subtype::LocalTime => TemporalValue::LocalTime(time_from_nanos(f[0])?),
        Subtype::LocalDateTime => TemporalValue::LocalDateTime(timestamp(f[0], f[1])?.naive_utc()),
        Subtype::Time => TemporalValue::Time {
            time: time_from_nanos(f[0])?,
            offset_seconds: offset_from(f[1])?.local_minus_utc(),
        },
        Subtype::DateTime => {
            TemporalValue::DateTime(timestamp(f[0], f[1])?.with_timezone(&offset_from(f[2])?))
        }
        Subtype::Duration => TemporalValue::Duration {
            months: f[0],
            days: f[1],
            seconds: f[2],
            nanos: i32::try_from(f[3])
                .map_err(|_| Error::codec(format!("invalid duration nanos {}", f[3])))?,
        },
    })
}

/// Encode a temporal value into property blocks
pub fn encode(key: u32, value: &TemporalValue) -> Result<Vec<u64>> {
    let (subtype, f) = fields(value);
    let mut header = types::header(key, PropertyType::Temporal)?;
    header |= (subtype as u64) << PAYLOAD_SHIFT;

    if subtype.field_count() == 1 {
        let field = f[0];
        if (INLINE_MIN..=INLINE_MAX).contains(&field) {
            return Ok(vec![header | INLINE_FLAG | ((field as u64) << INLINE_SHIFT)]);
        }
        return Ok(vec![header, field as u64]);
    }

    let (last, rest) = f
        .split_last()
        .ok_or_else(|| Error::codec("temporal value without fields"))?;
    let last = i32::try_from(*last)
        .map_err(|_| Error::codec(format!("{:?} trailing field {} exceeds 32 bits", subtype, last)))?;
    header |= (last as u32 as u64) << 32;

    let mut blocks = Vec::with_capacity(f.len());
    blocks.push(header);
    blocks.extend(rest.iter().map(|&v| v as u64));
    Ok(blocks)
}

fn subtype_of(header: u64) -> Result<Subtype> {
    Subtype::from_code((header >> PAYLOAD_SHIFT) & 0xF)
}

/// Blocks occupied by the temporal value whose header is `header`
pub fn block_count(header: u64) -> Result<usize> {
    let subtype = subtype_of(header)?;
    Ok(match subtype.field_count() {
        1 if header & INLINE_FLAG != 0 => 1,
        1 => 2,
        n => n,
    })
}

/// Decode a temporal value from its blocks
pub fn decode(blocks: &[u64]) -> Result<TemporalValue> {
    let header = *blocks
        .first()
        .ok_or_else(|| Error::codec("temporal without header block"))?;
    let subtype = subtype_of(header)?;
    let needed = block_count(header)?;
    let extra = blocks
        .get(1..needed)
        .ok_or_else(|| Error::codec("temporal blocks truncated"))?;

    let f: Vec<i64> = if subtype.field_count() == 1 {
        if header & INLINE_FLAG != 0 {
            vec![(header as i64) >> INLINE_SHIFT]
        } else {
            vec![extra[0] as i64]
        }
    } else {
        let mut f: Vec<i64> = extra.iter().map(|&v| v as i64).collect();
        f.push((header >> 32) as u32 as i32 as i64);
        f
    };
    from_fields(subtype, &f)
}

/// Array payload: subtype byte, then each element's fields as i64 LE
pub(crate) fn encode_array(values: &[TemporalValue], out: &mut Vec<u8>) -> Result<()> {
    let subtype = values.first().map(|v| fields(v).0).unwrap_or(Subtype::Date);
    out.push(subtype as u8);
    for value in values {
        let (element_subtype, f) = fields(value);
        if element_subtype != subtype {
            return Err(Error::codec("temporal array elements must share one kind"));
        }
        for field in f {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }
    Ok(())
}

/// Inverse of [`encode_array`]; `data` starts after the element tag
pub(crate) fn decode_array(data: &[u8]) -> Result<Vec<TemporalValue>> {
    let (&code, rest) = data
        .split_first()
        .ok_or_else(|| Error::codec("temporal array header truncated"))?;
    let subtype = Subtype::from_code(code as u64)?;
    let stride = subtype.field_count() * 8;
    if rest.len() % stride != 0 {
        return Err(Error::codec("temporal array truncated"));
    }
    rest.chunks_exact(stride)
        .map(|chunk| {
            let f: Vec<i64> = chunk
                .chunks_exact(8)
                .map(|b| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(b);
                    i64::from_le_bytes(raw)
                })
                .collect();
            from_fields(subtype, &f)
        })
        .collect()
}
