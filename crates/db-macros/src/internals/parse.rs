use quote::format_ident;
use syn::Field;
use super::types::{
    FieldData, ForeignKeyInfo, StructOptions, get_option_inner_type, is_json_type, is_option_type,
    map_rust_type_to_sql,
};

pub fn parse_foreign_key_attr(field: &Field) -> Option<ForeignKeyInfo> {
    for attr in field.attrs.iter() {
        if attr.path.is_ident("foreign_key") {
            if let Ok(syn::Meta::List(meta_list)) = attr.parse_meta() {
                let mut referenced_table_opt = None;
                let mut related_rust_type_str_opt = None;
                for nested in meta_list.nested.iter() {
                    if let syn::NestedMeta::Meta(syn::Meta::NameValue(mnv)) = nested {
                        if let syn::Lit::Str(lit_str) = &mnv.lit {
                            if mnv.path.is_ident("referenced_table") {
                                referenced_table_opt = Some(lit_str.value());
                            } else if mnv.path.is_ident("related_rust_type") {
                                related_rust_type_str_opt = Some(lit_str.value());
                            }
                        }
                    }
                }
                if let (Some(rt), Some(rrt_str)) = (referenced_table_opt, related_rust_type_str_opt) {
                    return Some(ForeignKeyInfo {
                        referenced_table: rt,
                        related_rust_type: format_ident!("{}", rrt_str),
                    });
                }
            }
        }
    }
    None
}

pub fn has_unique_attr(field: &Field) -> bool {
    field.attrs.iter().any(|attr| attr.path.is_ident("unique"))
}

pub fn has_indexed_attr(field: &Field) -> bool {
    field.attrs.iter().any(|attr| attr.path.is_ident("indexed"))
}

pub fn has_sqlx_skip_column_attr(field: &Field) -> bool {
    field.attrs.iter().any(|attr| attr.path.is_ident("sqlx_skip_column"))
}

fn name_value_str(attr: &syn::Attribute) -> syn::Result<String> {
    match attr.parse_meta()? {
        syn::Meta::NameValue(syn::MetaNameValue { lit: syn::Lit::Str(lit_str), .. }) => Ok(lit_str.value()),
        other => Err(syn::Error::new_spanned(
            other,
            "expected a name-value pair with a string literal, like #[table_name = \"my_table\"]",
        )),
    }
}

pub fn parse_struct_options(attrs: &[syn::Attribute]) -> syn::Result<StructOptions> {
    let mut options = StructOptions::default();
    for attr in attrs {
        if attr.path.is_ident("table_name") {
            options.table_name = Some(name_value_str(attr)?);
        } else if attr.path.is_ident("unique_together") {
            let columns: Vec<String> = name_value_str(attr)?
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            if columns.len() < 2 {
                return Err(syn::Error::new_spanned(attr, "unique_together needs at least two columns"));
            }
            options.unique_together.push(columns);
        }
    }
    Ok(options)
}

/// Gathers all relevant data from the struct's fields.
pub fn get_fields_data(fields: &syn::punctuated::Punctuated<syn::Field, syn::Token![,]>) -> Vec<FieldData> {
    fields.iter().filter_map(|field| {
        let field_ident = field.ident.as_ref()?;
        let field_ty = &field.ty;
        let field_is_option = is_option_type(field_ty);
        let field_is_pk = field_ident == "id";
        let field_is_skipped = has_sqlx_skip_column_attr(field);

        let type_for_analysis = get_option_inner_type(field_ty).unwrap_or_else(|| field_ty.clone());

        let sql_type_str = if field_is_skipped {
            "SKIP".to_string()
        } else if is_json_type(&type_for_analysis) {
            "JSONB".to_string()
        } else {
            map_rust_type_to_sql(&type_for_analysis, false)
        };

        Some(FieldData {
            name: field_ident.to_string(),
            ty: field_ty.clone(),
            is_option: field_is_option,
            is_pk: field_is_pk,
            is_skipped: field_is_skipped,
            sql_type: sql_type_str,
            foreign_key: parse_foreign_key_attr(field),
            unique: has_unique_attr(field),
            indexed: has_indexed_attr(field),
        })
    }).collect()
}
