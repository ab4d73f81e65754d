use sqlx::{postgres::PgArguments, Arguments, Error as SqlxError, Executor, FromRow, Postgres};
use sqlx::types::Uuid;

/// Trait to define the schema of a database object for PostgreSQL.
pub trait SqlxSchema: Send + Sync + Unpin + Clone + std::fmt::Debug {
    /// The type of the primary key for this database object.
    type Id: Send + Sync + for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Clone;

    /// The intermediate type that implements FromRow, used for fetching from the database.
    type Row: for<'r> FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin;

    const TABLE_NAME: &'static str;
    const ID_COLUMN_NAME: &'static str;
    const COLUMNS: &'static [&'static str];
    const INDEXES_SQL: &'static [&'static str];

    fn id_column_name() -> &'static str { Self::ID_COLUMN_NAME }
    fn table_name() -> &'static str { Self::TABLE_NAME }
    fn columns() -> &'static [&'static str] { Self::COLUMNS }
    fn indexes_sql() -> &'static [&'static str] { Self::INDEXES_SQL }

    /// Comma separated, quoted column list usable in SELECT and RETURNING clauses.
    fn select_columns_sql() -> String {
        Self::COLUMNS
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Retrieves the value of the primary key for an instance of the object.
    fn get_id_value(&self) -> Self::Id;

    /// Converts the intermediate Row type to the Self type.
    fn from_row(row: Self::Row) -> Self;

    // SQL generation methods, implemented by the derive macro
    fn create_table_sql() -> String;
    fn drop_table_sql() -> String;
    fn insert_sql() -> String;
    fn trigger_sql() -> String;
}

/// Trait for CRUD (Create, Read, Update, Delete) operations for PostgreSQL.
#[async_trait::async_trait]
pub trait SqlxCrud: SqlxSchema + SqlxFilterQuery + Sized {
    /// Binds the struct fields to an insert query.
    fn bind_insert<'q>(&self, query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>)
        -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>;

    /// Binds the struct fields to an update query, primary key last.
    fn bind_update<'q>(&self, query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>)
        -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>;

    /// Inserts the record and returns it as stored, with database defaults applied.
    async fn create<'e, E>(self, executor: E) -> Result<Self, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send;

    /// Overwrites every non-key column of the record identified by its primary key.
    async fn update<'e, E>(self, executor: E) -> Result<Self, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send;

    /// Deletes the record by its primary key, returning the affected row count.
    async fn delete<'e, E>(self, executor: E) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send;
}

/// Specifies the direction for ordering query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

// --- Filtering Structures ---

/// Lets `QueryCriteria` hold argument values of different types.
pub trait AsSqlxArg: Send + Sync {
    fn add_to_args(&self, args: &mut PgArguments) -> Result<(), SqlxError>;
}

impl<T> AsSqlxArg for T
where
    T: for<'a> sqlx::Encode<'a, Postgres> + sqlx::Type<Postgres> + Send + Sync + Clone + 'static,
{
    fn add_to_args(&self, args: &mut PgArguments) -> Result<(), SqlxError> {
        args.add(self.clone()).map_err(SqlxError::Encode)
    }
}

/// A single `"column" <operator> $n` condition.
pub struct FilterCondition {
    pub column: &'static str,
    pub operator: &'static str,
    /// Holds the value for the condition's placeholder, if any.
    pub value: Option<Box<dyn AsSqlxArg>>,
}

/// Case-insensitive substring match of one keyword over several columns,
/// rendered as `("a" ILIKE $n OR "b" ILIKE $n)`.
pub struct SearchCondition {
    pub columns: &'static [&'static str],
    pub pattern: String,
}

/// Everything needed to build a dynamic SELECT / COUNT / DELETE.
#[derive(Default)]
pub struct QueryCriteria {
    pub conditions: Vec<FilterCondition>,
    pub search: Option<SearchCondition>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Vec<(&'static str, OrderDirection)>,
}

impl QueryCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self::new().add_valued_filter("id", "=", id)
    }

    /// Adds a filter condition that may or may not have a value.
    pub fn add_filter<V>(mut self, column: &'static str, operator: &'static str, value: Option<V>) -> Self
    where
        V: for<'a> ::sqlx::Encode<'a, Postgres> + ::sqlx::Type<Postgres> + Send + Sync + Clone + 'static,
    {
        self.conditions.push(FilterCondition {
            column,
            operator,
            value: value.map(|v| Box::new(v) as Box<dyn AsSqlxArg>),
        });
        self
    }

    pub fn add_valued_filter<V>(self, column: &'static str, operator: &'static str, value: V) -> Self
    where
        V: for<'a> ::sqlx::Encode<'a, Postgres> + ::sqlx::Type<Postgres> + Send + Sync + Clone + 'static,
    {
        self.add_filter(column, operator, Some(value))
    }

    /// Adds the filter only when `value` is present.
    pub fn add_optional_filter<V>(self, column: &'static str, operator: &'static str, value: Option<V>) -> Self
    where
        V: for<'a> ::sqlx::Encode<'a, Postgres> + ::sqlx::Type<Postgres> + Send + Sync + Clone + 'static,
    {
        match value {
            Some(v) => self.add_valued_filter(column, operator, v),
            None => self,
        }
    }

    /// Case-insensitive substring search over `columns`. Blank keywords are ignored.
    pub fn search(mut self, columns: &'static [&'static str], keyword: Option<&str>) -> Self {
        if let Some(keyword) = keyword.map(str::trim).filter(|k| !k.is_empty()) {
            self.search = Some(SearchCondition {
                columns,
                pattern: format!("%{}%", escape_like(keyword)),
            });
        }
        self
    }

    pub fn limit(mut self, limit_val: i64) -> Self {
        self.limit = Some(limit_val);
        self
    }

    pub fn offset(mut self, offset_val: i64) -> Self {
        self.offset = Some(offset_val);
        self
    }

    pub fn order_by(mut self, column: &'static str, direction: OrderDirection) -> Self {
        self.order_by.push((column, direction));
        self
    }

    /// Renders the WHERE clause (without the keyword) and pushes its arguments.
    /// `placeholder_idx` is advanced past every placeholder used.
    pub fn where_sql(&self, arguments: &mut PgArguments, placeholder_idx: &mut usize) -> Result<Option<String>, SqlxError> {
        let mut clauses = Vec::new();

        for condition in &self.conditions {
            let mut clause = format!("\"{}\" {}", condition.column, condition.operator);
            if let Some(value) = &condition.value {
                value.add_to_args(arguments)?;
                clause.push_str(&format!(" ${}", placeholder_idx));
                *placeholder_idx += 1;
            }
            clauses.push(clause);
        }

        if let Some(search) = &self.search {
            if !search.columns.is_empty() {
                arguments.add(search.pattern.clone()).map_err(SqlxError::Encode)?;
                let ors = search.columns
                    .iter()
                    .map(|col| format!("\"{}\" ILIKE ${}", col, placeholder_idx))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                *placeholder_idx += 1;
                clauses.push(format!("({})", ors));
            }
        }

        if clauses.is_empty() {
            Ok(None)
        } else {
            Ok(Some(clauses.join(" AND ")))
        }
    }

    /// Renders ORDER BY / LIMIT / OFFSET and pushes their arguments.
    pub fn tail_sql(&self, arguments: &mut PgArguments, placeholder_idx: &mut usize) -> Result<String, SqlxError> {
        let mut parts = Vec::new();

        if !self.order_by.is_empty() {
            let order_clauses = self.order_by
                .iter()
                .map(|(col, dir)| format!("\"{}\" {}", col, dir.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("ORDER BY {}", order_clauses));
        }

        if let Some(limit_val) = self.limit {
            arguments.add(limit_val).map_err(SqlxError::Encode)?;
            parts.push(format!("LIMIT ${}", placeholder_idx));
            *placeholder_idx += 1;
        }

        if let Some(offset_val) = self.offset {
            arguments.add(offset_val).map_err(SqlxError::Encode)?;
            parts.push(format!("OFFSET ${}", placeholder_idx));
            *placeholder_idx += 1;
        }

        Ok(parts.join(" "))
    }
}

/// Escapes LIKE metacharacters so user input matches literally.
pub fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Trait for finding records based on dynamic filter criteria.
#[async_trait::async_trait]
pub trait SqlxFilterQuery: SqlxSchema + Sized {
    async fn find_by_criteria<'e, E>(
        criteria: QueryCriteria,
        executor: E,
    ) -> Result<Vec<Self>, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send,
    {
        let mut arguments = PgArguments::default();
        let mut placeholder_idx = 1;
        let mut sql = format!("SELECT {} FROM \"{}\"", Self::select_columns_sql(), Self::TABLE_NAME);

        if let Some(where_sql) = criteria.where_sql(&mut arguments, &mut placeholder_idx)? {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        let tail = criteria.tail_sql(&mut arguments, &mut placeholder_idx)?;
        if !tail.is_empty() {
            sql.push(' ');
            sql.push_str(&tail);
        }

        sqlx::query_as_with::<_, Self::Row, _>(&sql, arguments)
            .fetch_all(executor)
            .await
            .map(|rows| rows.into_iter().map(Self::from_row).collect())
    }

    /// Takes the first match; adds LIMIT 1 when the criteria carry no limit.
    async fn find_one_by_criteria<'e, E>(
        mut criteria: QueryCriteria,
        executor: E,
    ) -> Result<Option<Self>, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send,
    {
        if criteria.limit.is_none() {
            criteria = criteria.limit(1);
        };
        let mut results = Self::find_by_criteria(criteria, executor).await?;
        Ok(results.pop())
    }

    /// Counts matching rows. Ordering, limit and offset are ignored.
    async fn count_by_criteria<'e, E>(
        criteria: QueryCriteria,
        executor: E,
    ) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send,
    {
        let mut arguments = PgArguments::default();
        let mut placeholder_idx = 1;
        let mut sql = format!("SELECT COUNT(*) FROM \"{}\"", Self::TABLE_NAME);

        if let Some(where_sql) = criteria.where_sql(&mut arguments, &mut placeholder_idx)? {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        sqlx::query_scalar_with::<_, i64, _>(&sql, arguments)
            .fetch_one(executor)
            .await
    }

    async fn delete_by_criteria<'e, E>(
        criteria: QueryCriteria,
        executor: E,
    ) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send,
    {
        let mut arguments = PgArguments::default();
        let mut placeholder_idx = 1;
        let mut sql = format!("DELETE FROM \"{}\"", Self::TABLE_NAME);

        if let Some(where_sql) = criteria.where_sql(&mut arguments, &mut placeholder_idx)? {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        sqlx::query_with(&sql, arguments)
            .execute(executor)
            .await
            .map(|done| done.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(criteria: &QueryCriteria) -> (Option<String>, String, usize) {
        let mut args = PgArguments::default();
        let mut idx = 1;
        let where_sql = criteria.where_sql(&mut args, &mut idx).unwrap();
        let tail = criteria.tail_sql(&mut args, &mut idx).unwrap();
        (where_sql, tail, idx)
    }

    #[test]
    fn empty_criteria_renders_nothing() {
        let (where_sql, tail, idx) = render(&QueryCriteria::new());
        assert_eq!(where_sql, None);
        assert_eq!(tail, "");
        assert_eq!(idx, 1);
    }

    #[test]
    fn filters_search_and_paging_share_placeholders() {
        let criteria = QueryCriteria::new()
            .add_valued_filter("node_name", "=", "summarize".to_string())
            .search(&["name", "description"], Some("  csv "))
            .order_by("created_at", OrderDirection::Desc)
            .limit(10)
            .offset(20);

        let (where_sql, tail, idx) = render(&criteria);
        assert_eq!(
            where_sql.as_deref(),
            Some("\"node_name\" = $1 AND (\"name\" ILIKE $2 OR \"description\" ILIKE $2)")
        );
        assert_eq!(tail, "ORDER BY \"created_at\" DESC LIMIT $3 OFFSET $4");
        assert_eq!(idx, 5);
    }

    #[test]
    fn valueless_filter_takes_no_placeholder() {
        let criteria = QueryCriteria::new()
            .add_filter::<bool>("production", "IS TRUE", None)
            .add_optional_filter::<i32>("version", "=", None)
            .add_optional_filter("version", ">=", Some(2));
        let (where_sql, _, idx) = render(&criteria);
        assert_eq!(where_sql.as_deref(), Some("\"production\" IS TRUE AND \"version\" >= $1"));
        assert_eq!(idx, 2);
    }

    #[test]
    fn blank_search_is_ignored() {
        let criteria = QueryCriteria::new().search(&["name"], Some("   "));
        assert!(criteria.search.is_none());
    }

    #[test]
    fn search_pattern_escapes_like_metacharacters() {
        let criteria = QueryCriteria::new().search(&["name"], Some("100%_a\\b"));
        assert_eq!(criteria.search.unwrap().pattern, "%100\\%\\_a\\\\b%");
    }
}
