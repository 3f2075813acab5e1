//! Document headers, line items and terms, and the inputs that produce them
use super::error::ValidationError;
use super::types::{Amount, Currency, EntityKind, MarketType, TimeStamp};
use super::utils::non_blank;
use super::value::{MapBuilder, Value};
use chrono::Utc;

/// Which revisioning mechanism a document lineage is pinned to
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionPath {
    /// same document id, numbered version snapshots
    #[n(0)]
    Snapshot,
    /// new document per revision, linked through `parent_document_id`
    #[n(1)]
    Chain,
}

impl RevisionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionPath::Snapshot => "snapshot",
            RevisionPath::Chain => "chain",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Charges {
    #[n(0)]
    pub packing: Amount,
    #[n(1)]
    pub freight: Amount,
    #[n(2)]
    pub other: Amount,
}

impl Charges {
    pub fn new(packing: Amount, freight: Amount, other: Amount) -> Self {
        Self {
            packing,
            freight,
            other,
        }
    }
    /// None when the charges overflow
    pub fn total(&self) -> Option<Amount> {
        Amount::checked_sum([self.packing, self.freight, self.other])
    }
    fn validate(&self) -> Result<(), ValidationError> {
        for (name, amount) in [
            ("Packing charges", self.packing),
            ("Freight charges", self.freight),
            ("Other charges", self.other),
        ] {
            if amount.is_negative() {
                return Err(ValidationError::NegativeCharge(name));
            }
        }
        Ok(())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    #[n(0)]
    pub subtotal: Amount,
    #[n(1)]
    pub tax: Amount,
    #[n(2)]
    pub grand_total: Amount,
}

impl Totals {
    /// subtotal = sum of line totals, tax = subtotal x rate, grand = subtotal + tax + charges
    pub fn compute(
        items: &[LineItem],
        charges: &Charges,
        tax_rate: Amount,
    ) -> Result<Self, ValidationError> {
        let subtotal = Amount::checked_sum(items.iter().map(|item| item.line_total))
            .ok_or(ValidationError::TotalOutOfRange)?;
        let tax = subtotal
            .checked_mul(tax_rate)
            .ok_or(ValidationError::TotalOutOfRange)?
            .round_money();
        let grand_total = charges
            .total()
            .and_then(|charges| Amount::checked_sum([subtotal, tax, charges]))
            .ok_or(ValidationError::TotalOutOfRange)?;

        Ok(Self {
            subtotal,
            tax,
            grand_total,
        })
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    #[n(0)]
    pub line_no: u32,
    #[n(1)]
    pub product_id: Option<String>,
    #[n(2)]
    pub product_name: Option<String>,
    #[n(3)]
    pub description: Option<String>,
    #[n(4)]
    pub quantity: Amount,
    #[n(5)]
    pub unit_price: Amount,
    #[n(6)]
    pub discount_percent: Amount,
    #[n(7)]
    pub line_total: Amount,
    #[n(8)]
    pub uom: Option<String>,
    #[n(9)]
    pub size: Option<String>,
    #[n(10)]
    pub grade: Option<String>,
}

impl LineItem {
    pub fn to_value(&self) -> Value {
        MapBuilder::new()
            .field("line_no", self.line_no)
            .field("product_id", self.product_id.clone())
            .field("product_name", self.product_name.clone())
            .field("description", self.description.clone())
            .field("quantity", self.quantity)
            .field("unit_price", self.unit_price)
            .field("discount_percent", self.discount_percent)
            .field("line_total", self.line_total)
            .field("uom", self.uom.clone())
            .field("size", self.size.clone())
            .field("grade", self.grade.clone())
            .build()
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Term {
    #[n(0)]
    pub term_id: Option<String>,
    #[n(1)]
    pub custom_text: Option<String>,
    #[n(2)]
    pub display_order: u32,
}

impl Term {
    pub fn to_value(&self) -> Value {
        MapBuilder::new()
            .field("term_id", self.term_id.clone())
            .field("custom_text", self.custom_text.clone())
            .field("display_order", self.display_order)
            .build()
    }
}

/// Header record of a quotation, order, GRN, dispatch or invoice
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Document {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub kind: EntityKind,
    #[n(2)]
    pub document_number: String, // shared by every member of a chain
    #[n(3)]
    pub customer_id: String,
    #[n(4)]
    pub enquiry_id: Option<String>,
    #[n(5)]
    pub buyer_id: Option<String>,
    #[n(6)]
    pub project_name: Option<String>,
    #[n(7)]
    pub market_type: MarketType,
    #[n(8)]
    pub currency: Currency,
    #[n(9)]
    pub exchange_rate: Amount,
    #[n(10)]
    pub charges: Charges,
    #[n(11)]
    pub totals: Totals,
    #[n(12)]
    pub status: String,
    #[n(13)]
    pub version_number: u32,
    #[n(14)]
    pub is_latest_version: bool,
    #[n(15)]
    pub parent_document_id: Option<String>,
    #[n(16)]
    pub revision_path: Option<RevisionPath>,
    #[n(17)]
    pub valid_until: TimeStamp<Utc>,
    #[n(18)]
    pub validity_days: u32,
    #[n(19)]
    pub testing_standards: Vec<String>,
    #[n(20)]
    pub remarks: Option<String>,
    #[n(21)]
    pub approved_by: Option<String>,
    #[n(22)]
    pub approved_at: Option<TimeStamp<Utc>>,
    #[n(23)]
    pub rejection_reason: Option<String>,
    #[n(24)]
    pub created_by: String,
    #[n(25)]
    pub created_at: TimeStamp<Utc>,
    #[n(26)]
    pub updated_at: TimeStamp<Utc>,
}

impl Document {
    /// Before/after state recorded by the audit log
    pub fn to_value(&self) -> Value {
        MapBuilder::new()
            .field("id", self.id.as_str())
            .field("kind", self.kind.as_str())
            .field("document_number", self.document_number.as_str())
            .field("customer_id", self.customer_id.as_str())
            .field("enquiry_id", self.enquiry_id.clone())
            .field("buyer_id", self.buyer_id.clone())
            .field("project_name", self.project_name.clone())
            .field("market_type", self.market_type.as_str())
            .field("currency", self.currency.as_str())
            .field("exchange_rate", self.exchange_rate)
            .field("packing_charges", self.charges.packing)
            .field("freight_charges", self.charges.freight)
            .field("other_charges", self.charges.other)
            .field("subtotal", self.totals.subtotal)
            .field("tax_amount", self.totals.tax)
            .field("total_amount", self.totals.grand_total)
            .field("status", self.status.as_str())
            .field("version_number", self.version_number)
            .field("is_latest_version", self.is_latest_version)
            .field("parent_document_id", self.parent_document_id.clone())
            .field("revision_path", self.revision_path.map(|p| p.as_str()))
            .field("valid_until", self.valid_until.clone())
            .field("validity_days", self.validity_days)
            .field("testing_standards", self.testing_standards.clone())
            .field("remarks", self.remarks.clone())
            .field("approved_by", self.approved_by.clone())
            .field("approved_at", self.approved_at.clone())
            .field("rejection_reason", self.rejection_reason.clone())
            .field("created_by", self.created_by.as_str())
            .field("created_at", self.created_at.clone())
            .field("updated_at", self.updated_at.clone())
            .build()
    }

    /// Same checks `create` applies, run against a header after a partial update
    pub(crate) fn validate_header(&self, today: &TimeStamp<Utc>) -> Result<(), ValidationError> {
        self.validate_commercials()?;
        if self.valid_until.start_of_day() < today.start_of_day() {
            return Err(ValidationError::ValidUntilInPast);
        }
        Ok(())
    }

    /// Header checks that do not depend on the current date
    pub(crate) fn validate_commercials(&self) -> Result<(), ValidationError> {
        if self.customer_id.trim().is_empty() {
            return Err(ValidationError::Required("Customer"));
        }
        check_validity_days(self.validity_days)?;
        check_commercials(
            self.market_type,
            self.currency,
            self.exchange_rate,
            &self.charges,
            &self.totals,
        )
    }
}

/// Longest quotation validity accepted, about ten years
pub const MAX_VALIDITY_DAYS: u32 = 3650;

fn check_validity_days(days: u32) -> Result<(), ValidationError> {
    if days > MAX_VALIDITY_DAYS {
        return Err(ValidationError::ValidityOutOfRange {
            max: MAX_VALIDITY_DAYS,
        });
    }
    Ok(())
}

/// `from` plus `days`, refusing windows past [`MAX_VALIDITY_DAYS`]
pub(crate) fn validity_window(
    from: &TimeStamp<Utc>,
    days: u32,
) -> Result<TimeStamp<Utc>, ValidationError> {
    check_validity_days(days)?;
    from.plus_days(days).ok_or(ValidationError::ValidityOutOfRange {
        max: MAX_VALIDITY_DAYS,
    })
}

fn check_commercials(
    market_type: MarketType,
    currency: Currency,
    exchange_rate: Amount,
    charges: &Charges,
    totals: &Totals,
) -> Result<(), ValidationError> {
    if market_type == MarketType::Domestic && currency != Currency::INR {
        return Err(ValidationError::DomesticCurrency);
    }
    if currency != Currency::INR && !exchange_rate.is_positive() {
        return Err(ValidationError::InvalidExchangeRate);
    }
    charges.validate()?;
    if !totals.grand_total.is_positive() {
        return Err(ValidationError::NonPositiveTotal);
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineItemInput {
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub description: Option<String>,
    pub quantity: Amount,
    pub unit_price: Amount,
    pub discount_percent: Amount,
    pub uom: Option<String>,
    pub size: Option<String>,
    pub grade: Option<String>,
}

impl LineItemInput {
    pub fn new(quantity: Amount, unit_price: Amount) -> Self {
        Self {
            quantity,
            unit_price,
            ..Default::default()
        }
    }
    pub fn with_product(mut self, product_id: &str, product_name: &str) -> Self {
        self.product_id = Some(product_id.to_string());
        self.product_name = Some(product_name.to_string());
        self
    }
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn with_discount(mut self, percent: Amount) -> Self {
        self.discount_percent = percent;
        self
    }
    pub fn with_spec(mut self, size: &str, grade: &str, uom: &str) -> Self {
        self.size = Some(size.to_string());
        self.grade = Some(grade.to_string());
        self.uom = Some(uom.to_string());
        self
    }

    fn finalise(&self, line_no: u32) -> Result<LineItem, ValidationError> {
        if !self.quantity.is_positive() {
            return Err(ValidationError::NonPositiveQuantity { line: line_no });
        }
        if self.unit_price.is_negative() {
            return Err(ValidationError::NegativePrice { line: line_no });
        }
        if self.discount_percent.is_negative() || self.discount_percent > Amount::ONE_HUNDRED {
            return Err(ValidationError::DiscountOutOfRange { line: line_no });
        }
        if non_blank(self.product_id.as_deref()).is_none()
            && non_blank(self.description.as_deref()).is_none()
            && non_blank(self.product_name.as_deref()).is_none()
        {
            return Err(ValidationError::UnnamedItem { line: line_no });
        }

        let line_total = self
            .quantity
            .checked_mul(self.unit_price)
            .and_then(|gross| gross.checked_sub(self.discount_percent.percent_of(gross)?))
            .ok_or(ValidationError::AmountOutOfRange { line: line_no })?
            .round_money();

        Ok(LineItem {
            line_no,
            product_id: self.product_id.clone(),
            product_name: self.product_name.clone(),
            description: self.description.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount_percent: self.discount_percent,
            line_total,
            uom: self.uom.clone(),
            size: self.size.clone(),
            grade: self.grade.clone(),
        })
    }
}

/// Validates and prices a full replacement set of line items, numbered from 1
pub fn finalise_items(inputs: &[LineItemInput]) -> Result<Vec<LineItem>, ValidationError> {
    if inputs.is_empty() {
        return Err(ValidationError::NoItems);
    }
    inputs
        .iter()
        .zip(1u32..)
        .map(|(input, line_no)| input.finalise(line_no))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermInput {
    pub term_id: Option<String>,
    pub custom_text: Option<String>,
    pub display_order: Option<u32>,
}

impl TermInput {
    pub fn standard(term_id: &str) -> Self {
        Self {
            term_id: Some(term_id.to_string()),
            ..Default::default()
        }
    }
    pub fn custom(text: &str) -> Self {
        Self {
            custom_text: Some(text.to_string()),
            ..Default::default()
        }
    }
    pub fn at(mut self, display_order: u32) -> Self {
        self.display_order = Some(display_order);
        self
    }
}

/// Validates a full replacement set of terms. Unordered terms keep their input position.
pub fn finalise_terms(inputs: &[TermInput]) -> Result<Vec<Term>, ValidationError> {
    let mut terms = inputs
        .iter()
        .zip(1u32..)
        .map(|(input, position)| {
            let display_order = input.display_order.unwrap_or(position);
            if non_blank(input.term_id.as_deref()).is_none()
                && non_blank(input.custom_text.as_deref()).is_none()
            {
                return Err(ValidationError::EmptyTerm {
                    order: display_order,
                });
            }
            Ok(Term {
                term_id: input.term_id.clone(),
                custom_text: input.custom_text.clone(),
                display_order,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    terms.sort_by_key(|term| term.display_order);
    Ok(terms)
}

/// Caller input for a new document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInput {
    pub kind: EntityKind,
    pub customer_id: String,
    pub enquiry_id: Option<String>,
    pub buyer_id: Option<String>,
    pub project_name: Option<String>,
    pub market_type: MarketType,
    pub currency: Currency,
    pub exchange_rate: Option<Amount>,
    pub items: Vec<LineItemInput>,
    pub terms: Vec<TermInput>,
    pub testing_standards: Vec<String>,
    pub charges: Charges,
    pub valid_until: Option<TimeStamp<Utc>>,
    pub validity_days: Option<u32>,
    pub remarks: Option<String>,
    /// start in `pending_approval` instead of the kind's initial status
    pub submit_for_approval: bool,
    /// routes creation through the revision chain
    pub parent_document_id: Option<String>,
}

impl DocumentInput {
    /// Construct a new input object, this becomes the basis for a draft
    pub fn new(kind: EntityKind, customer_id: &str) -> Self {
        Self {
            kind,
            customer_id: customer_id.to_string(),
            enquiry_id: None,
            buyer_id: None,
            project_name: None,
            market_type: MarketType::Domestic,
            currency: Currency::INR,
            exchange_rate: None,
            items: vec![],
            terms: vec![],
            testing_standards: vec![],
            charges: Charges::default(),
            valid_until: None,
            validity_days: None,
            remarks: None,
            submit_for_approval: false,
            parent_document_id: None,
        }
    }
    pub fn add_item(mut self, item: LineItemInput) -> Self {
        self.items.push(item);
        self
    }
    pub fn add_term(mut self, term: TermInput) -> Self {
        self.terms.push(term);
        self
    }
    pub fn add_testing_standard(mut self, standard_id: &str) -> Self {
        self.testing_standards.push(standard_id.to_string());
        self
    }
    pub fn set_enquiry(mut self, enquiry_id: &str) -> Self {
        self.enquiry_id = Some(enquiry_id.to_string());
        self
    }
    pub fn set_buyer(mut self, buyer_id: &str) -> Self {
        self.buyer_id = Some(buyer_id.to_string());
        self
    }
    pub fn set_project(mut self, project_name: &str) -> Self {
        self.project_name = Some(project_name.to_string());
        self
    }
    pub fn set_export(mut self, currency: Currency, exchange_rate: Amount) -> Self {
        self.market_type = MarketType::Export;
        self.currency = currency;
        self.exchange_rate = Some(exchange_rate);
        self
    }
    pub fn set_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }
    pub fn set_charges(mut self, charges: Charges) -> Self {
        self.charges = charges;
        self
    }
    pub fn set_valid_until(mut self, valid_until: TimeStamp<Utc>) -> Self {
        self.valid_until = Some(valid_until);
        self
    }
    pub fn set_validity_days(mut self, days: u32) -> Self {
        self.validity_days = Some(days);
        self
    }
    pub fn set_remarks(mut self, remarks: &str) -> Self {
        self.remarks = Some(remarks.to_string());
        self
    }
    pub fn submit_on_create(mut self) -> Self {
        self.submit_for_approval = true;
        self
    }
    pub fn revision_of(mut self, parent_document_id: &str) -> Self {
        self.parent_document_id = Some(parent_document_id.to_string());
        self
    }
}

/// Partial header update plus optional full replacement of items and terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPatch {
    pub customer_id: Option<String>,
    pub buyer_id: Option<String>,
    pub project_name: Option<String>,
    pub currency: Option<Currency>,
    pub exchange_rate: Option<Amount>,
    pub charges: Option<Charges>,
    pub valid_until: Option<TimeStamp<Utc>>,
    pub validity_days: Option<u32>,
    pub remarks: Option<String>,
    pub testing_standards: Option<Vec<String>>,
    pub items: Option<Vec<LineItemInput>>,
    pub terms: Option<Vec<TermInput>>,
}

impl DocumentPatch {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_items(mut self, items: Vec<LineItemInput>) -> Self {
        self.items = Some(items);
        self
    }
    pub fn set_terms(mut self, terms: Vec<TermInput>) -> Self {
        self.terms = Some(terms);
        self
    }
    pub fn set_charges(mut self, charges: Charges) -> Self {
        self.charges = Some(charges);
        self
    }
    pub fn set_customer(mut self, customer_id: &str) -> Self {
        self.customer_id = Some(customer_id.to_string());
        self
    }
    pub fn set_project(mut self, project_name: &str) -> Self {
        self.project_name = Some(project_name.to_string());
        self
    }
    pub fn set_valid_until(mut self, valid_until: TimeStamp<Utc>) -> Self {
        self.valid_until = Some(valid_until);
        self
    }
    pub fn set_validity_days(mut self, days: u32) -> Self {
        self.validity_days = Some(days);
        self
    }
    pub fn set_remarks(mut self, remarks: &str) -> Self {
        self.remarks = Some(remarks.to_string());
        self
    }

    /// Items and terms are checked up front, before any read of stored state
    pub(crate) fn finalise_lists(
        &self,
    ) -> Result<(Option<Vec<LineItem>>, Option<Vec<Term>>), ValidationError> {
        let items = self.items.as_deref().map(finalise_items).transpose()?;
        let terms = self.terms.as_deref().map(finalise_terms).transpose()?;
        Ok((items, terms))
    }

    pub(crate) fn apply_header(&self, document: &mut Document) {
        if let Some(customer_id) = &self.customer_id {
            document.customer_id = customer_id.clone();
        }
        if let Some(buyer_id) = &self.buyer_id {
            document.buyer_id = Some(buyer_id.clone());
        }
        if let Some(project_name) = &self.project_name {
            document.project_name = Some(project_name.clone());
        }
        if let Some(currency) = self.currency {
            document.currency = currency;
        }
        if let Some(exchange_rate) = self.exchange_rate {
            document.exchange_rate = exchange_rate;
        }
        if let Some(charges) = self.charges {
            document.charges = charges;
        }
        if let Some(valid_until) = &self.valid_until {
            document.valid_until = valid_until.clone();
        }
        if let Some(validity_days) = self.validity_days {
            document.validity_days = validity_days;
        }
        if let Some(remarks) = &self.remarks {
            document.remarks = Some(remarks.clone());
        }
        if let Some(standards) = &self.testing_standards {
            document.testing_standards = standards.clone();
        }
    }
}

impl From<DocumentInput> for DocumentPatch {
    fn from(input: DocumentInput) -> Self {
        Self {
            customer_id: Some(input.customer_id),
            buyer_id: input.buyer_id,
            project_name: input.project_name,
            currency: Some(input.currency),
            exchange_rate: input.exchange_rate,
            charges: Some(input.charges),
            valid_until: input.valid_until,
            validity_days: input.validity_days,
            remarks: input.remarks,
            testing_standards: Some(input.testing_standards),
            items: Some(input.items),
            terms: (!input.terms.is_empty()).then_some(input.terms),
        }
    }
}
