mod internals;

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DataStruct, DeriveInput, Fields};

use internals::{codegen, parse};

/// Derives `SqlxSchema`, `SqlxCrud` and `SqlxFilterQuery` for a struct with
/// a `Uuid` field named `id`.
///
/// Struct attributes:
/// - `#[table_name = "prompts"]` (defaults to the lowercased struct name plus `s`)
/// - `#[unique_together = "node_name, version"]`, repeatable
///
/// Field attributes: `#[unique]`, `#[indexed]`, `#[sqlx_skip_column]` and
/// `#[foreign_key(referenced_table = "..", related_rust_type = "..")]`, which
/// also generates a `fetch_<field>` helper.
///
/// `created_at` / `updated_at` are stored as epoch-second `BIGINT`s filled by
/// the database; `updated_at` is kept current by a trigger.
#[proc_macro_derive(
    SqlxObject,
    attributes(table_name, unique_together, unique, indexed, foreign_key, sqlx_skip_column)
)]
pub fn sqlx_object_derive(input: TokenStream) -> TokenStream {
    let input_ast = parse_macro_input!(input as DeriveInput);
    let struct_name = &input_ast.ident;
    let row_struct_name = format_ident!("{}RowSqlx", struct_name);

    let options = match parse::parse_struct_options(&input_ast.attrs) {
        Ok(options) => options,
        Err(e) => return e.to_compile_error().into(),
    };

    let fields_named = match &input_ast.data {
        Data::Struct(DataStruct { fields: Fields::Named(fields_named), .. }) => &fields_named.named,
        _ => return TokenStream::from(quote! { compile_error!("#[derive(SqlxObject)] is only supported for structs with named fields."); }),
    };

    let fields_data = parse::get_fields_data(fields_named);
    if !fields_data.iter().any(|f| f.is_pk) {
        return TokenStream::from(quote! { compile_error!("#[derive(SqlxObject)] requires an `id: Uuid` field."); });
    }
    if let Err(msg) = codegen::check_unique_together(&options, &fields_data) {
        return TokenStream::from(quote! { compile_error!(#msg); });
    }

    let table_name = options
        .table_name
        .clone()
        .unwrap_or_else(|| struct_name.to_string().to_lowercase() + "s");

    let row_struct = codegen::generate_row_struct(&row_struct_name, &fields_data);
    let schema_impl = codegen::generate_sqlx_schema_impl(struct_name, &row_struct_name, &table_name, &options, &fields_data);
    let crud_impl = codegen::generate_sqlx_crud_impl(struct_name, &table_name, &fields_data);
    let filter_impl = codegen::generate_sqlx_filter_query_impl(struct_name);
    let fetch_helpers = codegen::generate_fetch_helpers(&fields_data);

    let expanded = quote! {
        #row_struct
        #schema_impl
        #crud_impl
        #filter_impl

        #[automatically_derived]
        impl #struct_name {
            #fetch_helpers
        }
    };

    TokenStream::from(expanded)
}
