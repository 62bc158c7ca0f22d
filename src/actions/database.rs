//! 数据库查询动作
//!
//! 自然语言 -> SQL 模板生成 + 内存 SQLite 执行。生成是确定性的纯函数，
//! payload() 返回将要执行的 SQL，使引擎能在执行前完成风险分级；
//! execute() 对同一参数必然生成同一 SQL（审批后延迟执行依赖这一点）。
//! Args: {"query": "natural language", "table_hint": "orders"}

use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;

use crate::actions::Action;

/// 订单域 schema 与样例数据（演示用内存库）
const DATABASE_SCHEMA: &str = "
CREATE TABLE orders (
    order_id VARCHAR(50) PRIMARY KEY,
    customer_id VARCHAR(50),
    order_date TIMESTAMP,
    total_amount DECIMAL(10, 2),
    status VARCHAR(20),
    payment_status VARCHAR(20),
    payment_method VARCHAR(20),
    error_message TEXT
);

CREATE TABLE order_items (
    item_id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id VARCHAR(50),
    product_id VARCHAR(50),
    quantity INTEGER,
    unit_price DECIMAL(10, 2)
);

CREATE TABLE inventory (
    product_id VARCHAR(50) PRIMARY KEY,
    product_name VARCHAR(200),
    stock_quantity INTEGER,
    available_quantity INTEGER,
    reorder_threshold INTEGER
);

CREATE TABLE system_logs (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id VARCHAR(50),
    timestamp TIMESTAMP,
    event_type VARCHAR(50),
    status VARCHAR(20),
    error_message TEXT,
    duration_ms INTEGER
);
";

const SAMPLE_DATA: &str = "
INSERT INTO orders VALUES
    ('GOOD001', 'CUST001', '2025-10-18 10:00:00', 299.99, 'completed', 'paid', 'credit_card', NULL),
    ('BAD001', 'CUST002', '2025-10-18 11:00:00', 499.99, 'failed', 'paid', 'credit_card', 'gateway_timeout'),
    ('GOOD002', 'CUST003', '2025-10-18 12:00:00', 149.99, 'completed', 'paid', 'paypal', NULL),
    ('BAD002', 'CUST005', '2025-10-18 13:30:00', 75.20, 'failed', 'failed', 'paypal', 'declined'),
    ('PEND001', 'CUST004', '2025-10-18 13:00:00', 799.99, 'pending', 'pending', 'credit_card', NULL);

INSERT INTO order_items (order_id, product_id, quantity, unit_price) VALUES
    ('GOOD001', 'PROD001', 2, 149.99),
    ('BAD001', 'PROD002', 1, 499.99),
    ('GOOD002', 'PROD003', 3, 49.99),
    ('PEND001', 'PROD001', 1, 149.99);

INSERT INTO inventory VALUES
    ('PROD001', 'Premium Widget A', 100, 90, 20),
    ('PROD002', 'Deluxe Widget B', 0, 0, 10),
    ('PROD003', 'Standard Widget C', 150, 145, 30);

INSERT INTO system_logs (order_id, timestamp, event_type, status, error_message, duration_ms) VALUES
    ('GOOD001', '2025-10-18 10:00:00', 'order_created', 'success', NULL, 45),
    ('GOOD001', '2025-10-18 10:00:15', 'payment_validated', 'success', NULL, 230),
    ('BAD001', '2025-10-18 11:00:00', 'order_created', 'success', NULL, 52),
    ('BAD001', '2025-10-18 11:02:00', 'inventory_check', 'failed', 'Insufficient inventory', 78000);
";

#[derive(Debug, Deserialize)]
struct DatabaseArgs {
    #[serde(default)]
    query: String,
    #[serde(default)]
    table_hint: Option<String>,
}

fn order_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[A-Z]+-?\d+\b").expect("order id regex"))
}

/// 自然语言 -> SQL 模板生成。纯函数：同一输入必然得到同一 SQL。
pub fn generate_sql(natural_language_query: &str, _table_hint: Option<&str>) -> String {
    let q = natural_language_query.to_lowercase();

    if q.contains("delete order") {
        // 仅在识别到订单号时生成真实的删除语句，供审批流程把关
        if let Some(m) = order_id_pattern().find(natural_language_query) {
            return format!("DELETE FROM orders WHERE order_id = '{}';", m.as_str());
        }
    }

    if q.contains("failed orders") {
        return "SELECT order_id, status, order_date, total_amount, payment_method, error_message\n\
                FROM orders\n\
                WHERE status = 'failed'\n\
                ORDER BY order_date DESC\n\
                LIMIT 100;"
            .to_string();
    }

    if q.contains("revenue") && q.contains("payment method") {
        return "SELECT payment_method, COUNT(*) AS transaction_count, SUM(total_amount) AS total_revenue\n\
                FROM orders\n\
                WHERE status = 'completed'\n\
                GROUP BY payment_method\n\
                ORDER BY total_revenue DESC;"
            .to_string();
    }

    if q.contains("all orders") || q.contains("orders from") {
        return "SELECT order_id, status, order_date, total_amount, customer_id\n\
                FROM orders\n\
                LIMIT 1000;"
            .to_string();
    }

    // 通用兜底：注释保留原始意图，风险分级据此识别未覆盖的写意图
    format!(
        "SELECT * FROM orders LIMIT 100;  -- Generic query for: {natural_language_query}"
    )
}

/// 数据库查询动作：NL -> SQL -> 内存 SQLite，结果渲染为 markdown 表格
pub struct QueryDatabaseAction {
    conn: Mutex<Connection>,
}

impl QueryDatabaseAction {
    /// 创建并灌入样例数据
    pub fn new() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(DATABASE_SCHEMA)?;
        conn.execute_batch(SAMPLE_DATA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 直接执行 SQL：SELECT 走查询渲染，其余走 execute 返回影响行数
    pub fn run_sql(&self, sql: &str) -> Result<String, String> {
        let conn = self.conn.lock().map_err(|_| "db lock poisoned".to_string())?;
        let head = sql.trim_start().to_uppercase();

        if head.starts_with("SELECT") || head.starts_with("WITH") {
            let mut stmt = conn.prepare(sql).map_err(|e| e.to_string())?;
            let columns: Vec<String> = stmt
                .column_names()
                .iter()
                .map(|c| c.to_string())
                .collect();
            let col_count = columns.len();

            let mut table = format!("| {} |\n", columns.join(" | "));
            table.push_str(&format!(
                "|{}\n",
                "---|".repeat(col_count)
            ));

            let mut rows = stmt.query([]).map_err(|e| e.to_string())?;
            let mut row_count = 0usize;
            while let Some(row) = rows.next().map_err(|e| e.to_string())? {
                let mut cells = Vec::with_capacity(col_count);
                for i in 0..col_count {
                    let cell = row
                        .get_ref(i)
                        .map(format_value)
                        .map_err(|e| e.to_string())?;
                    cells.push(cell);
                }
                table.push_str(&format!("| {} |\n", cells.join(" | ")));
                row_count += 1;
            }
            Ok(format!("{table}\n{row_count} rows returned"))
        } else {
            let affected = conn.execute(sql, []).map_err(|e| e.to_string())?;
            Ok(format!("{affected} rows affected"))
        }
    }
}

fn format_value(value: rusqlite::types::ValueRef<'_>) -> String {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => format!("{f:.2}"),
        ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

#[async_trait]
impl Action for QueryDatabaseAction {
    fn name(&self) -> &str {
        "query_database"
    }

    fn description(&self) -> &str {
        "Query the orders database in natural language; SQL is generated deterministically and \
         risky statements go through human approval. \
         Args: {\"query\": \"show all failed orders\", \"table_hint\": \"orders\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Natural language description of what data to retrieve"},
                "table_hint": {"type": "string", "description": "Optional hint about which table(s) to query"}
            },
            "required": ["query"]
        })
    }

    /// 将要执行的 SQL，作为风险分级的输入
    fn payload(&self, args: &Value) -> String {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
        let hint = args.get("table_hint").and_then(|v| v.as_str());
        generate_sql(query, hint)
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: DatabaseArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let sql = generate_sql(&args.query, args.table_hint.as_deref());
        let result = self.run_sql(&sql)?;
        Ok(format!(
            "DATABASE QUERY RESULTS\n\
             Natural language query: \"{}\"\n\
             \n\
             Executed SQL:\n{}\n\
             \n\
             {}",
            args.query, sql, result
        ))
    }
}
