use crate::pb::{memory::Unit, Filter, Laptop, Memory};

/// Decide whether a laptop satisfies every constraint of a filter.
///
/// All constraints are AND-combined. A zero field (or an absent `min_ram`)
/// leaves that attribute unconstrained: for the lower bounds this holds
/// naturally, `max_price_usd` needs the explicit check. Any other bound,
/// negative or NaN included, is compared as is. A laptop without a CPU
/// counts as zero cores at zero GHz, one without RAM as zero bits.
pub fn is_qualified(filter: &Filter, laptop: &Laptop) -> bool {
    let within_price = filter.max_price_usd == 0.0 || laptop.price_usd <= filter.max_price_usd;

    let (cores, min_ghz) = laptop
        .cpu
        .as_ref()
        .map(|cpu| (cpu.number_cores, cpu.min_ghz))
        .unwrap_or((0, 0.0));

    let required = filter.min_ram.as_ref().map(to_bit).unwrap_or(0);
    let available = laptop.ram.as_ref().map(to_bit).unwrap_or(0);

    within_price
        && cores >= filter.min_cpu_cores
        && min_ghz >= filter.min_cpu_ghz
        && available >= required
}

/// Normalize a memory amount to bits. Saturates instead of overflowing.
pub fn to_bit(memory: &Memory) -> u64 {
    let value = memory.value;

    match memory.unit() {
        Unit::Unknown | Unit::Bit => value,
        Unit::Byte => value.saturating_mul(1 << 3),
        Unit::Kilobyte => value.saturating_mul(1 << 13),
        Unit::Megabyte => value.saturating_mul(1 << 23),
        Unit::Gigabyte => value.saturating_mul(1 << 33),
        Unit::Terabyte => value.saturating_mul(1 << 43),
    }
}

/// Builder for search filters
#[derive(Debug, Default)]
pub struct FilterBuilder {
    filter: Filter,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_price_usd(mut self, price: f64) -> Self {
        self.filter.max_price_usd = price;
        self
    }

    pub fn min_cpu_cores(mut self, cores: u32) -> Self {
        self.filter.min_cpu_cores = cores;
        self
    }

    pub fn min_cpu_ghz(mut self, ghz: f64) -> Self {
        self.filter.min_cpu_ghz = ghz;
        self
    }

    pub fn min_ram(mut self, value: u64, unit: Unit) -> Self {
        self.filter.min_ram = Some(Memory::new(value, unit));
        self
    }

    pub fn build(self) -> Filter {
        self.filter
    }
}
