use quote::ToTokens;
use syn::{GenericArgument, PathArguments, Type};

#[derive(Debug)]
pub struct ForeignKeyInfo {
    pub referenced_table: String,
    pub related_rust_type: syn::Ident,
}

pub struct FieldData {
    pub name: String,
    pub ty: syn::Type,
    pub is_option: bool,
    pub is_pk: bool,
    pub is_skipped: bool,
    pub sql_type: String,
    pub foreign_key: Option<ForeignKeyInfo>,
    pub unique: bool,
    pub indexed: bool,
}

impl FieldData {
    pub fn is_timestamp(&self) -> bool {
        self.name == "created_at" || self.name == "updated_at"
    }

    /// Columns the application writes; the key and timestamps are left to the database.
    pub fn is_writable(&self) -> bool {
        !self.is_skipped && !self.is_pk && !self.is_timestamp()
    }
}

impl std::fmt::Debug for FieldData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldData")
            .field("name", &self.name)
            .field("ty", &self.ty.to_token_stream().to_string())
            .field("is_option", &self.is_option)
            .field("is_pk", &self.is_pk)
            .field("is_skipped", &self.is_skipped)
            .field("sql_type", &self.sql_type)
            .field("foreign_key", &self.foreign_key)
            .field("unique", &self.unique)
            .field("indexed", &self.indexed)
            .finish()
    }
}

/// Struct level options: `#[table_name = ".."]` and any number of
/// `#[unique_together = "col_a, col_b"]`.
#[derive(Debug, Default)]
pub struct StructOptions {
    pub table_name: Option<String>,
    pub unique_together: Vec<Vec<String>>,
}

fn single_generic_arg(ty: &Type, wrapper: &str) -> Option<Type> {
    if let Type::Path(type_path) = ty {
        if let Some(last_segment) = type_path.path.segments.last() {
            if last_segment.ident == wrapper {
                if let PathArguments::AngleBracketed(angle_args) = &last_segment.arguments {
                    if angle_args.args.len() == 1 {
                        if let GenericArgument::Type(inner_ty) = &angle_args.args[0] {
                            return Some(inner_ty.clone());
                        }
                    }
                }
            }
        }
    }
    None
}

pub fn is_option_type(ty: &Type) -> bool {
    get_option_inner_type(ty).is_some()
}

pub fn get_option_inner_type(ty: &Type) -> Option<Type> {
    single_generic_arg(ty, "Option")
}

pub fn get_vec_inner_type(ty: &Type) -> Option<Type> {
    single_generic_arg(ty, "Vec")
}

pub fn get_fully_qualified_type_string(ty: &Type) -> String {
    quote::quote!(#ty).to_string().replace(' ', "")
}

pub fn is_json_type(ty: &Type) -> bool {
    let type_str = get_fully_qualified_type_string(ty);
    ["Json<", "sqlx::types::Json<", "::sqlx::types::Json<"]
        .iter()
        .any(|prefix| type_str.starts_with(prefix))
}

/// Column type of a Rust type sqlx decodes natively, matched on the path as written.
fn native_sql_type(type_str: &str) -> Option<&'static str> {
    let last = type_str.rsplit("::").next().unwrap_or(type_str);
    let sql = match last {
        "String" => "TEXT",
        "i32" => "INTEGER",
        "i64" | "u32" | "u64" | "isize" | "usize" => "BIGINT",
        "f32" => "REAL",
        "f64" => "DOUBLE PRECISION",
        "bool" => "BOOLEAN",
        "Uuid" => "UUID",
        "NaiveDateTime" => "TIMESTAMP",
        "NaiveDate" => "DATE",
        _ if type_str == "Vec<u8>" => "BYTEA",
        _ if type_str.ends_with("DateTime<Utc>") || type_str.ends_with("DateTime<::chrono::Utc>") || type_str.ends_with("DateTime<chrono::Utc>") => "TIMESTAMPTZ",
        _ => return None,
    };
    Some(sql)
}

pub fn is_simple_type(ty: &Type) -> bool {
    native_sql_type(&get_fully_qualified_type_string(ty)).is_some() || is_json_type(ty)
}

/// Types stored as TEXT through `Display` / `FromStr`, such as status enums.
pub fn is_text_mapped_type(ty: &Type) -> bool {
    let type_str = get_fully_qualified_type_string(ty);
    !is_simple_type(ty) && !type_str.starts_with("Option<") && !type_str.starts_with("Vec<")
}

pub fn map_rust_type_to_sql(ty: &Type, processing_array_inner: bool) -> String {
    let type_str = get_fully_qualified_type_string(ty);
    if let Some(sql) = native_sql_type(&type_str) {
        return sql.to_string();
    }

    if !processing_array_inner {
        if let Some(inner_ty) = get_vec_inner_type(ty) {
            let inner_sql = map_rust_type_to_sql(&inner_ty, true);
            if inner_sql.ends_with("[]") || inner_sql == "JSONB" || inner_sql == "BYTEA" {
                panic!("Vec<{}> maps to {} which cannot be an SQL array element; wrap it in Json<..> instead.", quote::quote!(#inner_ty), inner_sql);
            }
            return format!("{}[]", inner_sql);
        }
    }

    if is_json_type(ty) {
        return "JSONB".to_string();
    }
    if is_text_mapped_type(ty) {
        return "TEXT".to_string();
    }
    panic!("Unsupported field type '{}': use a native type, Option<..>, Vec<..>, Json<..>, or a Display + FromStr + Default type stored as TEXT.", type_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_of(src: &str) -> String {
        map_rust_type_to_sql(&syn::parse_str::<Type>(src).unwrap(), false)
    }

    #[test]
    fn native_and_wrapped_types() {
        assert_eq!(sql_of("i32"), "INTEGER");
        assert_eq!(sql_of("sqlx::types::Uuid"), "UUID");
        assert_eq!(sql_of("Vec<u8>"), "BYTEA");
        assert_eq!(sql_of("Vec<String>"), "TEXT[]");
        assert_eq!(sql_of("Json<PromptBody>"), "JSONB");
        assert_eq!(sql_of("RunStatus"), "TEXT");
    }

    #[test]
    #[should_panic]
    fn nested_arrays_are_rejected() {
        sql_of("Vec<Vec<i32>>");
    }
}
