//! Disk capacity arithmetic.
//!
//! Two corrections are applied to declared capacities:
//!
//! - Mebibyte disks whose file is larger than the declared capacity are grown
//!   by the shortfall, rounded up to a whole MB (KB 2094271 rounding errors).
//! - Gibibyte disks more than [`EZT_TRIGGER_PERCENT`] full are grown so the
//!   populated data sits below the trigger. A thin disk crossing that fill
//!   level on import is converted to eager-zeroed-thick.

pub const BYTES_PER_MB: u64 = 1 << 20;
pub const BYTES_PER_GB: u64 = 1 << 30;
pub const BYTES_PER_TB: u64 = 1 << 40;

/// Fill percentage above which a thin disk is turned eager-zeroed-thick.
pub const EZT_TRIGGER_PERCENT: u64 = 60;

/// Unit of a declared disk capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityUnit {
    Mebibytes,
    Gibibytes,
    Tebibytes,
}

impl CapacityUnit {
    /// Parse an OVF `capacityAllocationUnits` string such as `byte * 2^30`.
    pub fn parse(units: &str) -> Option<Self> {
        if units.contains("byte * 2^20") {
            Some(Self::Mebibytes)
        } else if units.contains("byte * 2^30") {
            Some(Self::Gibibytes)
        } else if units.contains("byte * 2^40") {
            Some(Self::Tebibytes)
        } else {
            None
        }
    }

    /// Number of bytes in one unit.
    pub fn bytes(self) -> u64 {
        match self {
            Self::Mebibytes => BYTES_PER_MB,
            Self::Gibibytes => BYTES_PER_GB,
            Self::Tebibytes => BYTES_PER_TB,
        }
    }
}

impl std::fmt::Display for CapacityUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mebibytes => write!(f, "MB"),
            Self::Gibibytes => write!(f, "GB"),
            Self::Tebibytes => write!(f, "TB"),
        }
    }
}

/// New capacity in MB when `file_size` bytes do not fit in `capacity_mb`.
pub fn grow_to_fit(capacity_mb: u64, file_size: u64) -> Option<u64> {
    let capacity_bytes = capacity_mb.saturating_mul(BYTES_PER_MB);
    if file_size <= capacity_bytes {
        return None;
    }
    let shortfall = file_size - capacity_bytes;
    Some(capacity_mb + shortfall.div_ceil(BYTES_PER_MB))
}

/// Fill level of a gibibyte disk against the EZT trigger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EztCheck {
    /// Declared capacity in GB.
    pub capacity_gb: u64,
    /// Populated bytes.
    pub populated: u64,
    /// Smallest capacity in GB keeping the data at or under the trigger
    /// (never less than 1).
    pub proposed_gb: u64,
}

impl EztCheck {
    pub fn new(capacity_gb: u64, populated: u64) -> Self {
        let proposed = (u128::from(populated) * 100)
            .div_ceil(u128::from(EZT_TRIGGER_PERCENT) * u128::from(BYTES_PER_GB));
        Self {
            capacity_gb,
            populated,
            proposed_gb: u64::try_from(proposed).unwrap_or(u64::MAX).max(1),
        }
    }

    /// Whether the proposed size was clamped up to 1 GB because nothing is
    /// populated.
    pub fn minimally_used(&self) -> bool {
        self.populated == 0
    }

    /// Percentage of the declared capacity that is populated.
    pub fn percent_full(&self) -> f64 {
        percent(self.populated, self.capacity_gb)
    }

    /// Percentage of the proposed capacity that would be populated.
    pub fn proposed_percent_full(&self) -> f64 {
        percent(self.populated, self.proposed_gb)
    }

    /// Whether the declared capacity is over the trigger.
    pub fn exceeds_trigger(&self) -> bool {
        u128::from(self.populated) * 100
            > u128::from(self.capacity_gb)
                * u128::from(BYTES_PER_GB)
                * u128::from(EZT_TRIGGER_PERCENT)
    }

    /// New capacity in GB, if the disk needs to grow.
    pub fn new_capacity(&self) -> Option<u64> {
        self.exceeds_trigger().then_some(self.proposed_gb)
    }
}

fn percent(populated: u64, capacity_gb: u64) -> f64 {
    let capacity = capacity_gb as f64 * BYTES_PER_GB as f64;
    if capacity == 0.0 {
        return if populated == 0 { 0.0 } else { f64::INFINITY };
    }
    100.0 * populated as f64 / capacity
}
