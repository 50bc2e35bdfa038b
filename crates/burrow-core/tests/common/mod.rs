#![allow(dead_code)]

use std::sync::Arc;

use burrow_core::{Dialect, Model, Relation, Table};
use chrono::{DateTime, Utc};

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub emails: Vec<String>,
    #[burrow("rel:has-many,join:id=author_id")]
    pub stories: Vec<Story>,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
pub struct Story {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    #[burrow("rel:belongs-to")]
    pub author: Option<Box<User>>,
    #[burrow("rel:has-many,join:id=trackable_id,polymorphic")]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
pub struct Comment {
    pub id: i64,
    pub trackable_id: i64,
    pub trackable_type: String,
    pub text: String,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
pub struct Audit {
    pub created_at: DateTime<Utc>,
    #[burrow("editor,nullzero")]
    pub updated_by: String,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
#[burrow("table:accounts,alias:acc")]
pub struct Account {
    #[burrow("account_id,pk,type:uuid")]
    pub uid: String,
    #[burrow(",unique,notnull,default:'anonymous'")]
    pub handle: String,
    #[burrow("embed:audit_")]
    pub audit: Audit,
    #[burrow(",soft_delete")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[burrow(",scanonly")]
    pub story_count: i64,
    #[burrow("-")]
    pub session: String,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
pub struct Order {
    pub id: i64,
    #[burrow("m2m:order_to_items")]
    pub items: Vec<Item>,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
pub struct Item {
    pub id: i64,
    pub sku: String,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
#[burrow("table:order_to_items")]
pub struct OrderToItem {
    #[burrow(",pk")]
    pub order_id: i64,
    #[burrow("rel:belongs-to")]
    pub order: Option<Box<Order>>,
    #[burrow(",pk")]
    pub item_id: i64,
    #[burrow("rel:belongs-to")]
    pub item: Option<Box<Item>>,
}

pub fn table<T: Model>(dialect: &dyn Dialect) -> Arc<Table> {
    dialect
        .table(T::info())
        .unwrap_or_else(|e| panic!("Failed to resolve {}: {e}", std::any::type_name::<T>()))
}

pub fn relation<T: Model>(dialect: &dyn Dialect, name: &str) -> Arc<Relation> {
    let table = table::<T>(dialect);
    dialect
        .relation(&table, name)
        .unwrap_or_else(|e| panic!("Failed to resolve relation {name}: {e}"))
}

pub fn column_names(table: &Table) -> Vec<&str> {
    table.fields.iter().map(|f| f.name.as_str()).collect()
}
