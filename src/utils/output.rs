use std::fmt::Display;

/// Trait for types that can provide column values
pub trait GetColumnValue {
    type Column;

    fn get_column_value(&self, column: &Self::Column) -> String;
}

/// Output format configuration
#[derive(Clone, Debug)]
pub struct OutputFormat {
    pub raw: bool,
}

/// Build table rows from items and the requested columns
pub fn build_table_data<T>(items: &[T], parsed_columns: &[T::Column]) -> Vec<Vec<String>>
where
    T: GetColumnValue,
{
    items
        .iter()
        .map(|item| {
            parsed_columns
                .iter()
                .map(|col| item.get_column_value(col))
                .collect()
        })
        .collect()
}

/// Render rows the way `print_table` prints them
pub fn render_table<T>(data: &[Vec<T>], raw: bool) -> Vec<String>
where
    T: AsRef<str>,
{
    if data.is_empty() {
        return Vec::new();
    }

    if raw {
        return data
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.as_ref())
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect();
    }

    // column-aligned like `column -t`
    let num_cols = data.iter().map(Vec::len).max().unwrap_or(0);
    let mut col_widths = vec![0; num_cols];
    for row in data {
        for (i, cell) in row.iter().enumerate() {
            col_widths[i] = col_widths[i].max(cell.as_ref().chars().count());
        }
    }

    data.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, cell)| {
                    if i == row.len() - 1 {
                        cell.as_ref().to_string()
                    } else {
                        format!("{:<width$}", cell.as_ref(), width = col_widths[i])
                    }
                })
                .collect::<Vec<_>>()
                .join("  ")
        })
        .collect()
}

impl OutputFormat {
    pub fn new(raw: bool) -> Self {
        Self { raw }
    }

    /// Print tabular data - either raw (tab-separated) or formatted (column-aligned)
    pub fn print_table<T>(&self, data: &[Vec<T>])
    where
        T: Display + AsRef<str>,
    {
        for line in render_table(data, self.raw) {
            println!("{line}");
        }
    }

    /// Print key-value pairs
    pub fn print_key_value<K, V>(&self, pairs: &[(K, V)])
    where
        K: Display,
        V: Display,
    {
        let data: Vec<Vec<String>> = pairs
            .iter()
            .map(|(k, v)| vec![k.to_string(), v.to_string()])
            .collect();

        self.print_table(&data);
    }
}
