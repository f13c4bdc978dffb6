//! Schema compilation, differential sync and the migration runner against
//! in-memory SQLite.

use keel::migration::{compile, migration_file_name, Migration, Migrator, SchemaManager};
use keel::query::QueryBuilder;
use keel::{Dialect, Executor, ModelBuilder, Schema, SqliteExecutor};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn shop() -> Schema {
    Schema::builder()
        .model(ModelBuilder::new("Item").id().integer("quantity", false).belongs_to("Order").belongs_to("Product"))
        .model(ModelBuilder::new("Order").id().belongs_to("Customer").datetime("updated_at", true))
        .model(ModelBuilder::new("Product").id().string("sku", false).unique().decimal("price", false))
        .model(ModelBuilder::new("Customer").id().string("email", false).unique().has_many("Order"))
        .build()
        .unwrap()
}

fn table_names(executor: &SqliteExecutor) -> Vec<String> {
    executor
        .query_all("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name", &[])
        .unwrap()
        .into_iter()
        .filter_map(|row| row["name"].as_str().map(str::to_string))
        .filter(|name| !name.starts_with("sqlite_"))
        .collect()
}

fn column_count(executor: &SqliteExecutor, table: &str) -> usize {
    executor
        .query_all(&format!("PRAGMA table_info(\"{}\")", table), &[])
        .unwrap()
        .len()
}

#[test]
fn every_foreign_key_target_is_created_first() {
    let schema = shop();
    let compiled = compile(&schema, Dialect::Sqlite).unwrap();
    let position = |table: &str| {
        compiled
            .up
            .iter()
            .position(|s| s.starts_with(&format!("CREATE TABLE IF NOT EXISTS \"{}\"", table)))
            .unwrap()
    };

    assert!(position("customer") < position("order"));
    assert!(position("order") < position("item"));
    assert!(position("product") < position("item"));
    assert_eq!(compiled.down.len(), 4);
    assert_eq!(compiled.down.last().unwrap(), r#"DROP TABLE IF EXISTS "customer""#);
}

#[test]
fn applying_up_twice_is_idempotent() {
    let executor = SqliteExecutor::open_in_memory().unwrap();
    let manager = SchemaManager::new(&executor);
    let compiled = compile(&shop(), Dialect::Sqlite).unwrap();

    compiled.up(&manager).unwrap();
    let columns = column_count(&executor, "item");
    compiled.up(&manager).unwrap();

    assert_eq!(column_count(&executor, "item"), columns);
    assert_eq!(manager.sync(&shop()).unwrap(), 0);
    assert_eq!(table_names(&executor), vec!["customer", "item", "order", "product"]);

    compiled.down(&manager).unwrap();
    assert!(table_names(&executor).is_empty());
}

#[test]
fn sync_adds_new_columns_to_existing_tables() {
    let executor = SqliteExecutor::open_in_memory().unwrap();
    let manager = SchemaManager::new(&executor);
    manager.sync(&shop()).unwrap();

    let grown = Schema::builder()
        .model(ModelBuilder::new("Item").id().integer("quantity", false).belongs_to("Order").belongs_to("Product"))
        .model(ModelBuilder::new("Order").id().belongs_to("Customer").datetime("updated_at", true))
        .model(
            ModelBuilder::new("Product")
                .id()
                .string("sku", false)
                .unique()
                .decimal("price", false)
                .text("description", true),
        )
        .model(ModelBuilder::new("Customer").id().string("email", false).unique().has_many("Order"))
        .build()
        .unwrap();

    let before = column_count(&executor, "product");
    assert_eq!(manager.sync(&grown).unwrap(), 1);
    assert_eq!(column_count(&executor, "product"), before + 1);
    assert_eq!(manager.sync(&grown).unwrap(), 0);
}

#[test]
fn migrator_applies_and_rolls_back_sql_files() {
    let dir = TempDir::new().unwrap();
    let compiled = compile(&shop(), Dialect::Sqlite).unwrap().named("create shop", 20260101000000);
    fs::write(
        dir.path().join(migration_file_name(20260101000000, "create shop", "sql")),
        compiled.to_sql(),
    )
    .unwrap();
    fs::write(
        dir.path().join(migration_file_name(20260102000000, "seed customer", "sql")),
        "-- migrate:up\nINSERT INTO \"customer\" (\"id\", \"email\") VALUES ('c1', 'a@example.com');\n\
         -- migrate:down\nDELETE FROM \"customer\" WHERE \"id\" = 'c1';\n",
    )
    .unwrap();

    let executor = SqliteExecutor::open_in_memory().unwrap();
    let migrator = Migrator::from_dir(dir.path()).unwrap();

    let status = migrator.status(&executor).unwrap();
    assert_eq!(status.pending.len(), 2);
    assert_eq!(migrator.up(&executor, None).unwrap(), 2);

    let customers = QueryBuilder::table("customer")
        .build_select(Dialect::Sqlite)
        .fetch_all(&executor)
        .unwrap();
    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0]["email"], json!("a@example.com"));

    let status = migrator.validate(&executor).unwrap();
    assert!(status.is_up_to_date());
    assert_eq!(status.latest_applied_version(), Some(20260102000000));

    assert_eq!(migrator.down(&executor, None).unwrap(), 1);
    assert_eq!(migrator.status(&executor).unwrap().next_pending_version(), Some(20260102000000));
    assert_eq!(migrator.down(&executor, Some(1)).unwrap(), 1);
    assert_eq!(table_names(&executor), vec!["keel_migrations"]);
}

fn column_shape(executor: &SqliteExecutor, table: &str) -> Vec<(String, bool)> {
    executor
        .query_all(&format!("PRAGMA table_info(\"{}\")", table), &[])
        .unwrap()
        .into_iter()
        .map(|row| (row["name"].as_str().unwrap().to_string(), row["notnull"] == json!(1)))
        .collect()
}

#[test]
fn sync_converges_on_nullability_changes_and_keeps_rows() {
    let executor = SqliteExecutor::open_in_memory().unwrap();
    let manager = SchemaManager::new(&executor);
    manager.sync(&shop()).unwrap();
    executor
        .execute(r#"INSERT INTO "customer" ("id", "email") VALUES ('c1', 'a@example.com')"#, &[])
        .unwrap();
    executor
        .execute(r#"INSERT INTO "order" ("id", "customer_id") VALUES ('o1', 'c1')"#, &[])
        .unwrap();

    let relaxed = Schema::builder()
        .model(ModelBuilder::new("Item").id().integer("quantity", false).belongs_to("Order").belongs_to("Product"))
        .model(
            ModelBuilder::new("Order")
                .id()
                .belongs_to("Customer")
                .nullable(true)
                .datetime("updated_at", true),
        )
        .model(ModelBuilder::new("Product").id().string("sku", true).unique().decimal("price", false))
        .model(ModelBuilder::new("Customer").id().string("email", false).unique().has_many("Order"))
        .build()
        .unwrap();

    assert!(manager.sync(&relaxed).unwrap() > 0);
    assert_eq!(manager.sync(&relaxed).unwrap(), 0);
    assert!(column_shape(&executor, "order").contains(&("customer_id".to_string(), false)));
    assert!(column_shape(&executor, "product").contains(&("sku".to_string(), false)));

    let orders = QueryBuilder::table("order")
        .build_select(Dialect::Sqlite)
        .fetch_all(&executor)
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["customer_id"], json!("c1"));
    assert_eq!(
        QueryBuilder::table("customer")
            .build_select(Dialect::Sqlite)
            .fetch_all(&executor)
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn sync_drops_constrained_columns() {
    let executor = SqliteExecutor::open_in_memory().unwrap();
    let manager = SchemaManager::new(&executor);
    manager.sync(&shop()).unwrap();

    let trimmed = Schema::builder()
        .model(ModelBuilder::new("Item").id().integer("quantity", false).belongs_to("Product"))
        .model(ModelBuilder::new("Order").id().belongs_to("Customer").datetime("updated_at", true))
        .model(ModelBuilder::new("Product").id().decimal("price", false))
        .model(ModelBuilder::new("Customer").id().string("email", false).unique().has_many("Order"))
        .build()
        .unwrap();

    manager.sync(&trimmed).unwrap();
    let names = |table: &str| -> Vec<String> { column_shape(&executor, table).into_iter().map(|(n, _)| n).collect() };
    assert_eq!(names("product"), vec!["id", "price"]);
    assert_eq!(names("item"), vec!["id", "quantity", "product_id"]);

    let fks = executor
        .query_all(r#"SELECT "table" FROM pragma_foreign_key_list('item')"#, &[])
        .unwrap();
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0]["table"], json!("product"));
    assert_eq!(manager.sync(&trimmed).unwrap(), 0);
}
