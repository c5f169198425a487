// src/gen/mod.rs
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use csv::Writer;
use rand::Rng;
use std::io::{Cursor, Write};
use tracing::info;
use uuid::Uuid;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const MERCHANT_NAMES: &[&str] = &[
    "Tech", "Spark", "Volt", "Nano", "Sync", "Proto", "Quantum", "Byte", "Pulse", "Gear", "Hex",
    "Vibe", "Echo", "Glide", "Nex", "Flex", "Optic", "Circuit", "Zylo", "Fusion",
];

const MERCHANT_POSTFIXES: &[&str] = &[
    "Co.",
    "Ltd.",
    "Inc.",
    "Corporation",
    "LLC",
    "GmbH",
    "Enterprises",
    "Industries",
    "Solutions",
    "Group",
];

const PRODUCT_NAMES: &[&str] = &[
    "Gear", "Widget", "Cog", "Circuit", "Gizmo", "Module", "Bolt", "Spring", "Lever", "Crank",
    "Rotor", "Piston", "Valve", "Switch", "Spark", "Servo", "Pulley", "Ratchet", "Sprocket",
    "Nodule",
];

#[derive(Debug, Clone)]
pub struct Merchant {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TransactionLine {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
}

/// One merchant's worth of synthetic data, shaped like the per-merchant
/// slice the loader endpoint exports (merchant_id columns excluded).
#[derive(Debug, Clone)]
pub struct MerchantDataset {
    pub merchant: Merchant,
    pub products: Vec<Product>,
    pub transactions: Vec<Transaction>,
    pub lines: Vec<TransactionLine>,
}

/// Upper bounds for the generated entity counts; actual counts are drawn
/// per merchant. Seven lines per transaction matches the production ratio.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub max_products: usize,
    pub max_transactions: usize,
    pub lines_per_transaction: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            max_products: 100,
            max_transactions: 10_000,
            lines_per_transaction: 7,
        }
    }
}

/// Generate one merchant with products, transactions and transaction lines.
pub fn generate<R: Rng>(rng: &mut R, config: &GeneratorConfig) -> MerchantDataset {
    let merchant = Merchant {
        id: Uuid::new_v4(),
        name: format!(
            "{}{} {}",
            MERCHANT_NAMES[rng.gen_range(0..MERCHANT_NAMES.len())],
            MERCHANT_NAMES[rng.gen_range(0..MERCHANT_NAMES.len())],
            MERCHANT_POSTFIXES[rng.gen_range(0..MERCHANT_POSTFIXES.len())],
        ),
    };

    let products: Vec<Product> = (0..rng.gen_range(1..=config.max_products))
        .map(|_| Product {
            id: Uuid::now_v7(),
            name: format!(
                "{} {}",
                PRODUCT_NAMES[rng.gen_range(0..PRODUCT_NAMES.len())],
                PRODUCT_NAMES[rng.gen_range(0..PRODUCT_NAMES.len())],
            ),
            price_cents: rng.gen_range(100..10_100),
        })
        .collect();

    let now = Utc::now();
    let transactions: Vec<Transaction> = (0..rng.gen_range(1..=config.max_transactions))
        .map(|_| Transaction {
            id: Uuid::now_v7(),
            created_at: now - Duration::hours(rng.gen_range(0..24 * 365)),
        })
        .collect();

    let lines: Vec<TransactionLine> = (0..transactions.len() * config.lines_per_transaction)
        .map(|_| TransactionLine {
            id: Uuid::now_v7(),
            transaction_id: transactions[rng.gen_range(0..transactions.len())].id,
            product_id: products[rng.gen_range(0..products.len())].id,
            quantity: rng.gen_range(0..13),
        })
        .collect();

    info!(
        merchant = %merchant.name,
        products = products.len(),
        transactions = transactions.len(),
        lines = lines.len(),
        "generated dataset"
    );

    MerchantDataset {
        merchant,
        products,
        transactions,
        lines,
    }
}

/// Write the dataset as a ZIP of CSV entries, one table per entry, exactly
/// the archive format `ingest::load_archive` consumes.
pub fn write_archive(dataset: &MerchantDataset) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buf));
        add_entry(&mut zip, "merchants.csv", &merchants_csv(dataset)?)?;
        add_entry(&mut zip, "products.csv", &products_csv(dataset)?)?;
        add_entry(&mut zip, "transactions.csv", &transactions_csv(dataset)?)?;
        add_entry(
            &mut zip,
            "transaction_lines.csv",
            &lines_csv(dataset)?,
        )?;
        zip.finish()?;
    }
    Ok(buf)
}

fn add_entry(zip: &mut ZipWriter<Cursor<&mut Vec<u8>>>, name: &str, csv: &[u8]) -> Result<()> {
    let options: FileOptions<'_, ()> =
        FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name, options)?;
    zip.write_all(csv)?;
    Ok(())
}

fn merchants_csv(dataset: &MerchantDataset) -> Result<Vec<u8>> {
    let mut w = Writer::from_writer(Vec::new());
    w.write_record(["id", "name"])?;
    w.write_record([
        dataset.merchant.id.to_string(),
        dataset.merchant.name.clone(),
    ])?;
    Ok(w.into_inner().map_err(|e| anyhow::anyhow!("csv flush: {e}"))?)
}

fn products_csv(dataset: &MerchantDataset) -> Result<Vec<u8>> {
    let mut w = Writer::from_writer(Vec::new());
    w.write_record(["id", "name", "price_cents"])?;
    for p in &dataset.products {
        w.write_record([p.id.to_string(), p.name.clone(), p.price_cents.to_string()])?;
    }
    Ok(w.into_inner().map_err(|e| anyhow::anyhow!("csv flush: {e}"))?)
}

fn transactions_csv(dataset: &MerchantDataset) -> Result<Vec<u8>> {
    let mut w = Writer::from_writer(Vec::new());
    w.write_record(["id", "created_at"])?;
    for t in &dataset.transactions {
        w.write_record([t.id.to_string(), t.created_at.to_rfc3339()])?;
    }
    Ok(w.into_inner().map_err(|e| anyhow::anyhow!("csv flush: {e}"))?)
}

fn lines_csv(dataset: &MerchantDataset) -> Result<Vec<u8>> {
    let mut w = Writer::from_writer(Vec::new());
    w.write_record(["id", "transaction_id", "product_id", "quantity"])?;
    for l in &dataset.lines {
        w.write_record([
            l.id.to_string(),
            l.transaction_id.to_string(),
            l.product_id.to_string(),
            l.quantity.to_string(),
        ])?;
    }
    Ok(w.into_inner().map_err(|e| anyhow::anyhow!("csv flush: {e}"))?)
}
