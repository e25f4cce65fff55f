use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Table")]
    pub label: String,
    #[tabled(rename = "Rows")]
    pub value: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            label: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stats_table(stats: &[(String, usize)]) -> String {
    let mut builder = TableBuilder::new();
    for (table, rows) in stats {
        builder.add_row(table, &rows.to_string());
    }
    builder.build()
}

/// One line of the `steps` listing
#[derive(Tabled)]
pub struct StepRow {
    #[tabled(rename = "Id")]
    pub id: i64,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Depends on")]
    pub preceding: String,
    #[tabled(rename = "Results")]
    pub results: usize,
    #[tabled(rename = "Output")]
    pub output: String,
}

pub fn steps_table(rows: &[StepRow]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_table() {
        let table = stats_table(&[("results".to_string(), 3), ("projects".to_string(), 1)]);
        assert!(table.contains("results"));
        assert!(table.contains("Rows"));
        assert!(stats_table(&[]).is_empty());
    }

    #[test]
    fn test_steps_table() {
        let table = steps_table(&[StepRow {
            id: 1,
            kind: "RHF".into(),
            preceding: "-".into(),
            results: 2,
            output: "/path/to/rhf.out".into(),
        }]);
        assert!(table.contains("Depends on"));
        assert!(table.contains("RHF"));
    }
}
