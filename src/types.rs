//! Core value types shared by documents, snapshots and audit events
use super::error::{ValidationError, WorkflowError};
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// `Utc` itself is not ordered, so the derive would not apply
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Into::into)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }
    /// Midnight UTC of the same calendar day
    pub fn start_of_day(&self) -> Self {
        Self(self.date().and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
    }
    /// None when the result falls outside chrono's range
    pub fn plus_days(&self, days: u32) -> Option<Self> {
        self.0.checked_add_days(Days::new(days.into())).map(Self)
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl fmt::Display for TimeStamp<Utc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Exact decimal used for quantities, prices, percentages and money.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);
    pub const ONE_HUNDRED: Amount = Amount(Decimal::ONE_HUNDRED);

    /// `Amount::new(1850, 2)` is 18.50
    pub fn new(num: i64, scale: u32) -> Self {
        Self(Decimal::new(num, scale))
    }
    pub fn units(value: i64) -> Self {
        Self(Decimal::from(value))
    }
    pub fn decimal(&self) -> Decimal {
        self.0
    }
    pub fn round_money(self) -> Self {
        Self(self.0.round_dp(2))
    }
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }
    pub fn checked_add(self, rhs: Amount) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }
    pub fn checked_sub(self, rhs: Amount) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }
    pub fn checked_mul(self, rhs: Amount) -> Option<Self> {
        self.0.checked_mul(rhs.0).map(Self)
    }
    /// `self` percent of `base`, None on overflow
    pub fn percent_of(self, base: Amount) -> Option<Self> {
        base.0
            .checked_mul(self.0)?
            .checked_div(Decimal::ONE_HUNDRED)
            .map(Self)
    }
    /// Sum that stops at the first overflow
    pub fn checked_sum(amounts: impl IntoIterator<Item = Amount>) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |acc, amount| acc.checked_add(amount))
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl FromStr for Amount {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Self)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul for Amount {
    type Output = Amount;
    fn mul(self, rhs: Self) -> Self::Output {
        Self(self.0 * rhs.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, Add::add)
    }
}

// rust_decimal's 16 byte wire form, kept as a CBOR byte string
impl<C> minicbor::Encode<C> for Amount {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&self.0.serialize())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Amount {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let raw: [u8; 16] = d
            .bytes()?
            .try_into()
            .map_err(|_| minicbor::decode::Error::message("amount must be 16 bytes"))?;

        Ok(Amount(Decimal::deserialize(raw)))
    }
}

/// Authenticated caller. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Result<Self, WorkflowError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(WorkflowError::Auth);
        }
        Ok(Self(id))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    #[n(0)]
    Enquiry,
    #[n(1)]
    Quotation,
    #[n(2)]
    SalesOrder,
    #[n(3)]
    PurchaseOrder,
    #[n(4)]
    Grn,
    #[n(5)]
    Dispatch,
    #[n(6)]
    Invoice,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Enquiry,
        EntityKind::Quotation,
        EntityKind::SalesOrder,
        EntityKind::PurchaseOrder,
        EntityKind::Grn,
        EntityKind::Dispatch,
        EntityKind::Invoice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Enquiry => "enquiry",
            EntityKind::Quotation => "quotation",
            EntityKind::SalesOrder => "sales_order",
            EntityKind::PurchaseOrder => "purchase_order",
            EntityKind::Grn => "grn",
            EntityKind::Dispatch => "dispatch",
            EntityKind::Invoice => "invoice",
        }
    }

    /// Prefix handed to the document number generator
    pub fn number_prefix(&self) -> &'static str {
        match self {
            EntityKind::Enquiry => "ENQ",
            EntityKind::Quotation => "QTN",
            EntityKind::SalesOrder => "SO",
            EntityKind::PurchaseOrder => "PO",
            EntityKind::Grn => "GRN",
            EntityKind::Dispatch => "DSP",
            EntityKind::Invoice => "INV",
        }
    }

    pub fn initial_status(&self) -> &'static str {
        match self {
            EntityKind::Enquiry => "open",
            EntityKind::Grn => "pending_inspection",
            EntityKind::Dispatch => "pending",
            _ => "draft",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownEntityKind(s.to_string()))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, Eq, Ord, PartialEq, PartialOrd)]
pub enum Currency {
    #[default]
    #[n(0)]
    INR,
    #[n(1)]
    USD,
    #[n(2)]
    EUR,
    #[n(3)]
    GBP,
    #[n(4)]
    AED,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::INR => "INR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::AED => "AED",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum MarketType {
    #[default]
    #[n(0)]
    Domestic,
    #[n(1)]
    Export,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Domestic => "DOMESTIC",
            MarketType::Export => "EXPORT",
        }
    }
}
