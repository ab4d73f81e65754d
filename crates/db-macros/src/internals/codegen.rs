use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Ident, LitStr, Type, parse_quote};
use super::types::{
    FieldData, StructOptions, get_option_inner_type, get_vec_inner_type, is_text_mapped_type,
};

fn is_vec_of_text_mapped(ty: &Type) -> Option<Type> {
    get_vec_inner_type(ty).filter(|inner| is_text_mapped_type(inner))
}

fn quoted_columns(fields: &[&FieldData]) -> String {
    fields.iter().map(|f| format!("\"{}\"", f.name)).collect::<Vec<String>>().join(", ")
}

pub fn generate_row_struct(row_struct_name: &Ident, fields_data: &[FieldData]) -> TokenStream {
    let row_struct_fields_defs: Vec<TokenStream> = fields_data.iter().filter(|f| !f.is_skipped).map(|field| {
        let field_ident = format_ident!("{}", field.name);
        let field_ty = &field.ty;
        let type_for_analysis = get_option_inner_type(field_ty).unwrap_or_else(|| field_ty.clone());

        let row_field_ty: Type = if is_text_mapped_type(&type_for_analysis) {
            if field.is_option { parse_quote!(Option<String>) } else { parse_quote!(String) }
        } else if is_vec_of_text_mapped(field_ty).is_some() {
            parse_quote!(Vec<String>)
        } else {
            field_ty.clone()
        };
        quote! { pub #field_ident: #row_field_ty }
    }).collect();

    quote! {
        #[derive(::sqlx::FromRow, Debug, Clone)]
        #[automatically_derived]
        pub struct #row_struct_name {
            #(#row_struct_fields_defs),*
        }
    }
}

pub fn generate_sqlx_schema_impl(
    struct_name: &Ident,
    row_struct_name: &Ident,
    table_name_str: &str,
    options: &StructOptions,
    fields_data: &[FieldData],
) -> TokenStream {
    let active_fields: Vec<_> = fields_data.iter().filter(|f| !f.is_skipped).collect();
    let has_updated_at = active_fields.iter().any(|f| f.name == "updated_at");

    let all_sql_column_names_str_lits: Vec<LitStr> = active_fields.iter()
        .map(|f| LitStr::new(&f.name, proc_macro2::Span::call_site()))
        .collect();

    let from_row_assignments = generate_from_row_assignments(fields_data);

    let (create_table_sql_query, create_index_sqls) = generate_create_table_sql(table_name_str, options, fields_data);
    let drop_table_sql_query = format!("DROP TABLE IF EXISTS \"{}\" CASCADE", table_name_str);
    let insert_sql_query = generate_insert_sql(table_name_str, &active_fields);

    let trigger_sql_impl = if has_updated_at {
        let trigger_name = format!("set_updated_at_{}", table_name_str);
        format!(
            "DROP TRIGGER IF EXISTS {trigger} ON \"{table}\"; CREATE TRIGGER {trigger} BEFORE UPDATE ON \"{table}\" FOR EACH ROW EXECUTE PROCEDURE set_updated_at_unix_timestamp();",
            trigger = trigger_name,
            table = table_name_str
        )
    } else {
        "".to_string()
    };

    quote! {
        #[automatically_derived]
        impl ::promptlab_database::SqlxSchema for #struct_name {
            type Id = ::sqlx::types::Uuid;
            type Row = #row_struct_name;

            const TABLE_NAME: &'static str = #table_name_str;
            const ID_COLUMN_NAME: &'static str = "id";
            const COLUMNS: &'static [&'static str] = &[#( #all_sql_column_names_str_lits ),*];
            const INDEXES_SQL: &'static [&'static str] = &[#( #create_index_sqls ),*];

            fn get_id_value(&self) -> Self::Id { self.id }

            fn from_row(row: Self::Row) -> Self {
                Self {
                    #(#from_row_assignments),*
                }
            }

            fn insert_sql() -> String { #insert_sql_query.to_string() }
            fn create_table_sql() -> String { #create_table_sql_query.to_string() }
            fn drop_table_sql() -> String { #drop_table_sql_query.to_string() }
            fn trigger_sql() -> String { #trigger_sql_impl.to_string() }
        }
    }
}

pub fn generate_sqlx_crud_impl(struct_name: &Ident, table_name_str: &str, fields_data: &[FieldData]) -> TokenStream {
    let bindings = generate_bind_streams(fields_data);
    let update_sql = generate_update_sql(table_name_str, fields_data);
    let delete_sql = format!("DELETE FROM \"{}\" WHERE \"id\" = $1", table_name_str);

    quote! {
        #[automatically_derived]
        #[::async_trait::async_trait]
        impl ::promptlab_database::SqlxCrud for #struct_name {
            fn bind_insert<'q>(
                &self,
                query: ::sqlx::query::QueryAs<'q, ::sqlx::Postgres, <Self as ::promptlab_database::SqlxSchema>::Row, ::sqlx::postgres::PgArguments>
            ) -> ::sqlx::query::QueryAs<'q, ::sqlx::Postgres, <Self as ::promptlab_database::SqlxSchema>::Row, ::sqlx::postgres::PgArguments> {
                query #(#bindings)*
            }

            fn bind_update<'q>(
                &self,
                query: ::sqlx::query::QueryAs<'q, ::sqlx::Postgres, <Self as ::promptlab_database::SqlxSchema>::Row, ::sqlx::postgres::PgArguments>
            ) -> ::sqlx::query::QueryAs<'q, ::sqlx::Postgres, <Self as ::promptlab_database::SqlxSchema>::Row, ::sqlx::postgres::PgArguments> {
                query #(#bindings)* .bind(self.id)
            }

            async fn create<'e, E>(self, executor: E) -> ::core::result::Result<Self, ::sqlx::Error>
            where
                E: ::sqlx::Executor<'e, Database = ::sqlx::Postgres> + Send,
                Self: Send
            {
                let sql = <Self as ::promptlab_database::SqlxSchema>::insert_sql();
                self.bind_insert(::sqlx::query_as::<_, <Self as ::promptlab_database::SqlxSchema>::Row>(&sql))
                    .fetch_one(executor)
                    .await
                    .map(<Self as ::promptlab_database::SqlxSchema>::from_row)
            }

            async fn update<'e, E>(self, executor: E) -> ::core::result::Result<Self, ::sqlx::Error>
            where
                E: ::sqlx::Executor<'e, Database = ::sqlx::Postgres> + Send,
                Self: Send
            {
                let sql = #update_sql;
                self.bind_update(::sqlx::query_as::<_, <Self as ::promptlab_database::SqlxSchema>::Row>(&sql))
                    .fetch_one(executor)
                    .await
                    .map(<Self as ::promptlab_database::SqlxSchema>::from_row)
            }

            async fn delete<'e, E>(self, executor: E) -> ::core::result::Result<u64, ::sqlx::Error>
            where
                E: ::sqlx::Executor<'e, Database = ::sqlx::Postgres> + Send,
                Self: Send
            {
                ::sqlx::query(#delete_sql)
                    .bind(self.id)
                    .execute(executor)
                    .await
                    .map(|done| done.rows_affected())
            }
        }
    }
}

/// Criteria queries are provided by the trait's default methods.
pub fn generate_sqlx_filter_query_impl(struct_name: &Ident) -> TokenStream {
    quote! {
        #[automatically_derived]
        impl ::promptlab_database::SqlxFilterQuery for #struct_name {}
    }
}

pub fn generate_fetch_helpers(fields_data: &[FieldData]) -> TokenStream {
    let fetch_helper_methods: Vec<TokenStream> = fields_data.iter().filter_map(|field| {
        let fk_info = field.foreign_key.as_ref()?;
        let field_ident = format_ident!("{}", field.name);
        let fetch_method_name = format_ident!("fetch_{}", field_ident);
        let related_type = &fk_info.related_rust_type;
        let id_column_name_of_related_type = quote!{ <#related_type as ::promptlab_database::SqlxSchema>::id_column_name() };

        let lookup = if field.is_option {
            quote! {
                match self.#field_ident {
                    Some(id_val) => {
                        let criteria = ::promptlab_database::QueryCriteria::new()
                            .add_valued_filter(#id_column_name_of_related_type, "=", id_val);
                        <#related_type as ::promptlab_database::SqlxFilterQuery>::find_one_by_criteria(criteria, executor).await
                    }
                    None => Ok(None),
                }
            }
        } else {
            quote! {
                let criteria = ::promptlab_database::QueryCriteria::new()
                    .add_valued_filter(#id_column_name_of_related_type, "=", self.#field_ident);
                <#related_type as ::promptlab_database::SqlxFilterQuery>::find_one_by_criteria(criteria, executor).await
            }
        };

        Some(quote! {
            pub async fn #fetch_method_name<'exe, E>(
                &self,
                executor: E
            ) -> ::core::result::Result<::core::option::Option<#related_type>, ::sqlx::Error>
            where
                E: ::sqlx::Executor<'exe, Database = ::sqlx::Postgres> + Send,
            {
                #lookup
            }
        })
    }).collect();

    quote! { #(#fetch_helper_methods)* }
}

fn generate_from_row_assignments(fields_data: &[FieldData]) -> Vec<TokenStream> {
    let mut assignments: Vec<TokenStream> = fields_data.iter()
        .filter(|f| !f.is_skipped)
        .map(|field| {
            let field_ident = format_ident!("{}", field.name);
            let type_for_analysis = get_option_inner_type(&field.ty).unwrap_or_else(|| field.ty.clone());

            if is_text_mapped_type(&type_for_analysis) {
                if field.is_option {
                    quote! { #field_ident: row.#field_ident.map(|s| s.parse().unwrap_or_else(|_| <#type_for_analysis>::default())) }
                } else {
                    quote! { #field_ident: row.#field_ident.parse().unwrap_or_else(|_| <#type_for_analysis>::default()) }
                }
            } else if let Some(vec_inner_ty) = is_vec_of_text_mapped(&field.ty) {
                quote! { #field_ident: row.#field_ident.into_iter().map(|s: String| s.parse().unwrap_or_else(|_| <#vec_inner_ty>::default())).collect() }
            } else {
                quote! { #field_ident: row.#field_ident }
            }
        })
        .collect();

    assignments.extend(fields_data.iter().filter(|f| f.is_skipped).map(|field| {
        let field_ident = format_ident!("{}", field.name);
        quote! { #field_ident: Default::default() }
    }));
    assignments
}

pub fn generate_create_table_sql(table_name_str: &str, options: &StructOptions, fields_data: &[FieldData]) -> (String, Vec<LitStr>) {
    let mut create_table_parts: Vec<String> = Vec::new();
    let mut foreign_key_clauses: Vec<String> = Vec::new();
    let mut create_index_sqls: Vec<LitStr> = Vec::new();

    for field in fields_data.iter().filter(|f| !f.is_skipped) {
        let mut col_def_parts = vec![format!("\"{}\"", field.name)];

        if field.is_pk {
            col_def_parts.push(field.sql_type.clone());
            col_def_parts.push("PRIMARY KEY DEFAULT gen_random_uuid()".to_string());
        } else if field.is_timestamp() {
            col_def_parts.push("BIGINT NOT NULL DEFAULT floor(extract(epoch from now()))".to_string());
        } else {
            col_def_parts.push(field.sql_type.clone());
            if !field.is_option {
                col_def_parts.push("NOT NULL".to_string());
            }
        }

        if field.unique {
            col_def_parts.push("UNIQUE".to_string());
        }

        if field.indexed {
            let index_sql = format!(
                "CREATE INDEX IF NOT EXISTS \"idx_{table}_{col}\" ON \"{table}\"(\"{col}\")",
                table = table_name_str,
                col = field.name
            );
            create_index_sqls.push(LitStr::new(&index_sql, proc_macro2::Span::call_site()));
        }

        create_table_parts.push(col_def_parts.join(" "));

        if let Some(fk_info) = &field.foreign_key {
            foreign_key_clauses.push(format!(
                "FOREIGN KEY (\"{}\") REFERENCES \"{}\"(\"id\") ON DELETE SET NULL ON UPDATE CASCADE",
                field.name, fk_info.referenced_table
            ));
        }
    }

    for columns in &options.unique_together {
        create_table_parts.push(format!(
            "CONSTRAINT \"uq_{}_{}\" UNIQUE ({})",
            table_name_str,
            columns.join("_"),
            columns.iter().map(|c| format!("\"{}\"", c)).collect::<Vec<_>>().join(", ")
        ));
    }
    create_table_parts.extend(foreign_key_clauses);

    let create_table_sql_query = format!("CREATE TABLE IF NOT EXISTS \"{}\" ({})", table_name_str, create_table_parts.join(", "));
    (create_table_sql_query, create_index_sqls)
}

pub fn generate_insert_sql(table_name_str: &str, active_fields: &[&FieldData]) -> String {
    let writable: Vec<&FieldData> = active_fields.iter().copied().filter(|f| f.is_writable()).collect();

    if writable.is_empty() {
        return format!("INSERT INTO \"{}\" DEFAULT VALUES RETURNING {}", table_name_str, quoted_columns(active_fields));
    }

    let placeholders = (1..=writable.len()).map(|i| format!("${}", i)).collect::<Vec<String>>().join(", ");
    format!(
        "INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING {}",
        table_name_str,
        quoted_columns(&writable),
        placeholders,
        quoted_columns(active_fields)
    )
}

pub fn generate_update_sql(table_name_str: &str, fields_data: &[FieldData]) -> String {
    let active_fields: Vec<_> = fields_data.iter().filter(|f| !f.is_skipped).collect();

    let set_clauses: Vec<String> = active_fields.iter()
        .filter(|f| f.is_writable())
        .enumerate()
        .map(|(i, f)| format!("\"{}\" = ${}", f.name, i + 1))
        .collect();

    let all_columns = quoted_columns(&active_fields);
    if set_clauses.is_empty() {
        format!("SELECT {} FROM \"{}\" WHERE \"id\" = $1", all_columns, table_name_str)
    } else {
        format!(
            "UPDATE \"{}\" SET {} WHERE \"id\" = ${} RETURNING {}",
            table_name_str,
            set_clauses.join(", "),
            set_clauses.len() + 1,
            all_columns
        )
    }
}

fn generate_bind_streams(fields_data: &[FieldData]) -> Vec<TokenStream> {
    fields_data.iter().filter(|f| f.is_writable()).map(|field| {
        let field_ident = format_ident!("{}", field.name);
        let type_for_analysis = get_option_inner_type(&field.ty).unwrap_or_else(|| field.ty.clone());

        if is_text_mapped_type(&type_for_analysis) {
            if field.is_option {
                quote! { .bind(self.#field_ident.as_ref().map(|v| v.to_string())) }
            } else {
                quote! { .bind(self.#field_ident.to_string()) }
            }
        } else if is_vec_of_text_mapped(&field.ty).is_some() {
            quote! { .bind(self.#field_ident.iter().map(|v| v.to_string()).collect::<Vec<String>>()) }
        } else {
            quote! { .bind(self.#field_ident.clone()) }
        }
    }).collect()
}

/// Rejects `unique_together` entries naming columns the struct does not store.
pub fn check_unique_together(options: &StructOptions, fields_data: &[FieldData]) -> Result<(), String> {
    for columns in &options.unique_together {
        for column in columns {
            let known = fields_data.iter().any(|f| !f.is_skipped && &f.name == column);
            if !known {
                return Err(format!("unique_together references unknown column '{}'", column));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internals::parse::get_fields_data;
    use crate::internals::types::get_fully_qualified_type_string;

    fn fields(item: syn::ItemStruct) -> Vec<FieldData> {
        match item.fields {
            syn::Fields::Named(named) => get_fields_data(&named.named),
            _ => unreachable!(),
        }
    }

    fn sample() -> Vec<FieldData> {
        fields(parse_quote! {
            struct Sample {
                pub id: Uuid,
                #[indexed]
                pub node_name: String,
                pub version: i32,
                pub note: Option<String>,
                pub status: SampleStatus,
                pub tags: Vec<String>,
                #[sqlx_skip_column]
                pub scratch: String,
                pub created_at: i64,
                pub updated_at: i64,
            }
        })
    }

    #[test]
    fn text_mapped_types_become_text_columns() {
        let fields = sample();
        let status = fields.iter().find(|f| f.name == "status").unwrap();
        assert_eq!(status.sql_type, "TEXT");
        let tags = fields.iter().find(|f| f.name == "tags").unwrap();
        assert_eq!(tags.sql_type, "TEXT[]");
        assert!(get_fully_qualified_type_string(&status.ty) == "SampleStatus");
    }

    #[test]
    fn insert_skips_key_timestamps_and_skipped_columns() {
        let fields = sample();
        let active: Vec<_> = fields.iter().filter(|f| !f.is_skipped).collect();
        assert_eq!(
            generate_insert_sql("samples", &active),
            "INSERT INTO \"samples\" (\"node_name\", \"version\", \"note\", \"status\", \"tags\") VALUES ($1, $2, $3, $4, $5) \
             RETURNING \"id\", \"node_name\", \"version\", \"note\", \"status\", \"tags\", \"created_at\", \"updated_at\""
        );
    }

    #[test]
    fn update_binds_key_last() {
        let sql = generate_update_sql("samples", &sample());
        assert!(sql.starts_with("UPDATE \"samples\" SET \"node_name\" = $1, \"version\" = $2"));
        assert!(sql.contains("WHERE \"id\" = $6 RETURNING"));
    }

    #[test]
    fn create_table_carries_composite_unique_and_indexes() {
        let options = StructOptions {
            table_name: None,
            unique_together: vec![vec!["node_name".to_string(), "version".to_string()]],
        };
        let (sql, indexes) = generate_create_table_sql("samples", &options, &sample());
        assert!(sql.contains("\"id\" UUID PRIMARY KEY DEFAULT gen_random_uuid()"));
        assert!(sql.contains("\"note\" TEXT,"));
        assert!(sql.contains("\"version\" INTEGER NOT NULL"));
        assert!(sql.contains("\"created_at\" BIGINT NOT NULL DEFAULT floor(extract(epoch from now()))"));
        assert!(sql.contains("CONSTRAINT \"uq_samples_node_name_version\" UNIQUE (\"node_name\", \"version\")"));
        assert!(!sql.contains("scratch"));
        assert_eq!(indexes.len(), 1);
        assert_eq!(
            indexes[0].value(),
            "CREATE INDEX IF NOT EXISTS \"idx_samples_node_name\" ON \"samples\"(\"node_name\")"
        );
    }

    #[test]
    fn unknown_unique_together_column_is_rejected() {
        let options = StructOptions {
            table_name: None,
            unique_together: vec![vec!["node_name".to_string(), "missing".to_string()]],
        };
        let err = check_unique_together(&options, &sample()).unwrap_err();
        assert!(err.contains("missing"));
    }
}
