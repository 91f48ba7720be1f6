//! # Seed Data Generator
//!
//! Populates a database with sample batches and a handful of bills for
//! development.
//!
//! ## Usage
//! ```bash
//! # Seed the default dev database
//! cargo run -p bazaar-db --bin seed
//!
//! # Specify database path
//! cargo run -p bazaar-db --bin seed -- --db ./data/bazaar.db
//! ```

use std::env;

use tracing_subscriber::EnvFilter;

use bazaar_core::Money;
use bazaar_db::engine::billing::{create_bill, BillLine, NewBill};
use bazaar_db::engine::inventory::{create_batch, NewBatch};
use bazaar_db::repository::item;
use bazaar_db::{Database, DbConfig};
use bazaar_core::PaymentMode;

/// (name, brand, expiry, mrp paise, stock, rack)
const BATCHES: &[(&str, Option<&str>, Option<&str>, i64, i64, Option<&str>)] = &[
    ("Dolo 650", Some("Micro Labs"), Some("2027-03-31"), 3200, 40, Some("A1")),
    ("Dolo 650", Some("Micro Labs"), Some("2026-08-31"), 3000, 0, Some("A1")),
    ("Crocin Advance", Some("GSK"), Some("2027-01-31"), 2500, 25, Some("A2")),
    ("Zincovit", Some("Apex"), Some("2026-12-31"), 10500, 18, Some("B1")),
    ("Volini Spray", Some("Sun Pharma"), Some("2027-06-30"), 27500, 12, Some("B3")),
    ("Digene Gel", Some("Abbott"), Some("2026-11-30"), 14200, 9, Some("C2")),
    ("Cetrizine", None, Some("2028-01-31"), 1800, 60, Some("A3")),
    ("Band-Aid Strips", Some("J&J"), None, 4500, 30, Some("D1")),
    ("Thermometer Digital", None, None, 19900, 5, Some("D4")),
    ("ORS Sachet", None, Some("2026-10-31"), 2100, 80, Some("C1")),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./bazaar_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Bazaar POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./bazaar_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Bazaar POS Seed Data Generator");
    println!("==============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected, migrations applied");

    let existing = {
        let mut conn = db.pool().acquire().await?;
        item::count(&mut conn).await?
    };
    if existing > 0 {
        println!("⚠ Database already has {existing} batches; skipping seed.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Seeding batches...");
    let mut ids = Vec::new();
    for &(name, brand, expiry, mrp, stock, rack) in BATCHES {
        let created = create_batch(
            &db,
            NewBatch {
                name: name.to_string(),
                brand: brand.map(String::from),
                expiry_date: expiry.map(String::from),
                mrp: Money::from_paise(mrp),
                opening_stock: stock,
                rack_number: rack.map(String::from),
            },
        )
        .await?;
        println!("  #{:<3} {:<22} stock {:>3}", created.item.id, name, stock);
        ids.push((created.item.id, mrp, stock));
    }

    println!();
    println!("Writing a few sample bills...");
    let mut bills = 0;
    for &(item_id, mrp, stock) in ids.iter().take(4) {
        if stock < 2 {
            continue;
        }
        let total = Money::from_paise(mrp * 2);
        create_bill(
            &db,
            NewBill {
                lines: vec![BillLine { item_id, quantity: 2, unit_price: None }],
                discount_percent: 0.0,
                payment_mode: PaymentMode::Cash,
                payment_cash: total,
                payment_online: Money::zero(),
                payment_credit: Money::zero(),
                final_amount: None,
                notes: Some("seed data".to_string()),
            },
        )
        .await?;
        bills += 1;
    }

    println!("✓ Seeded {} batches, {} bills", BATCHES.len(), bills);
    Ok(())
}
