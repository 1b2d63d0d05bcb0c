use core::fmt;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    UnknownItem(String),
    ZeroQuantity,
}

impl fmt::Display for CartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownItem(sku) => write!(f, "unknown item {sku:?}"),
            Self::ZeroQuantity => f.write_str("quantity must be positive"),
        }
    }
}

impl core::error::Error for CartError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Line {
    quantity: u32,
    unit_price_cents: u64,
}

#[derive(Debug, Default)]
pub struct Cart {
    lines: BTreeMap<String, Line>,
}

impl Cart {
    pub fn add(&mut self, sku: &str, quantity: u32, unit_price_cents: u64) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }
        self.lines
            .entry(sku.to_owned())
            .and_modify(|line| line.quantity += quantity)
            .or_insert(Line {
                quantity,
                unit_price_cents,
            });
        Ok(())
    }

    pub fn remove(&mut self, sku: &str) -> Result<u32, CartError> {
        self.lines
            .remove(sku)
            .map(|line| line.quantity)
            .ok_or_else(|| CartError::UnknownItem(sku.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_cents(&self) -> u64 {
        self.lines
            .values()
            .map(|line| u64::from(line.quantity) * line.unit_price_cents)
            .sum()
    }

    pub fn discounted_cents(&self, percent: u8) -> u64 {
        let percent = u64::from(percent.min(100));
        self.total_cents() * (100 - percent) / 100
    }
}
