use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "dray")]
#[command(author = "Dray Team")]
#[command(version = "0.1.0")]
#[command(about = "Order-to-courier dispatch engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory
    #[arg(short, long, default_value = "config", env = "DRAY_CONFIG_DIR")]
    pub config: String,

    /// Emit JSON instead of plain text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Assign an order to the first free delivery agent
    Assign {
        /// Order reference (e.g., ORD-1042)
        order_ref: String,
    },
    /// Show each agent's in-window load and availability
    Agents,
}

/// One row of the `agents` availability view.
#[derive(Debug, Serialize)]
pub struct AgentLoadRow {
    pub id: i64,
    pub name: String,
    pub capacity: i32,
    pub active: i64,
    pub free: bool,
}

/// Plain-text rendering for the `agents` view.
pub fn render_agents_table(rows: &[AgentLoadRow]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<6} {:<24} {:>6} {:>4}  {}\n",
        "ID", "NAME", "ACTIVE", "CAP", "STATUS"
    ));
    for row in rows {
        out.push_str(&format!(
            "{:<6} {:<24} {:>6} {:>4}  {}\n",
            row.id,
            row.name,
            row.active,
            row.capacity,
            if row.free { "FREE" } else { "BUSY" }
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_agents_table() {
        let rows = vec![
            AgentLoadRow {
                id: 1,
                name: "Courier A".to_string(),
                capacity: 2,
                active: 2,
                free: false,
            },
            AgentLoadRow {
                id: 2,
                name: "Courier B".to_string(),
                capacity: 4,
                active: 1,
                free: true,
            },
        ];

        let table = render_agents_table(&rows);
        assert!(table.contains("Courier A"));
        assert!(table.contains("BUSY"));
        assert!(table.contains("FREE"));
        assert_eq!(table.lines().count(), 3);
    }
}
