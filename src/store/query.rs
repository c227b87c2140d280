/// Select builder rendered as PostgREST query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub table: String,
    pub columns: String,
    pub filters: Vec<(String, String)>,
    /// (column, ascending)
    pub order: Option<(String, bool)>,
    pub limit: Option<u64>,
    /// Inclusive row window, sent as a `Range` header.
    pub range: Option<(u64, u64)>,
    pub count: bool,
    /// Only the count is wanted, no body.
    pub head: bool,
}

impl Select {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.into(),
            columns: "*".into(),
            filters: Vec::new(),
            order: None,
            limit: None,
            range: None,
            count: false,
            head: false,
        }
    }

    pub fn columns(mut self, cols: &str) -> Self {
        self.columns = cols.split_whitespace().collect();
        self
    }

    pub fn eq(mut self, col: &str, val: &str) -> Self {
        self.filters.push((col.into(), val.into()));
        self
    }

    pub fn order(mut self, col: &str, ascending: bool) -> Self {
        self.order = Some((col.into(), ascending));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.range = Some((from, to));
        self
    }

    pub fn exact_count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn head(mut self) -> Self {
        self.head = true;
        self.count = true;
        self
    }

    pub fn params(&self) -> Vec<(String, String)> {
        let mut out = vec![("select".to_string(), self.columns.clone())];
        for (col, val) in &self.filters {
            out.push((col.clone(), format!("eq.{val}")));
        }
        if let Some((col, asc)) = &self.order {
            let dir = if *asc { "asc" } else { "desc" };
            out.push(("order".into(), format!("{col}.{dir}")));
        }
        if let Some(n) = self.limit {
            out.push(("limit".into(), n.to_string()));
        }
        out
    }
}
