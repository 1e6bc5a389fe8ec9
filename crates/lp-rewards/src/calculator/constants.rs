use rust_decimal::{Decimal, dec};

// |Σ normalized - 1| must stay below this
pub const NORMALIZATION_TOLERANCE: Decimal = dec!(0.00000001);

// Pool share tokens are ERC20s with 18 decimals unless configured otherwise
pub const DEFAULT_SHARE_DECIMALS: u32 = 18;

// rust_decimal mantissa limit
pub const MAX_DECIMAL_SCALE: u32 = 28;

// 7 * 24 * 60 * 60
pub const SECONDS_PER_WEEK: u64 = 604_800;
