//! Text handling for model answers: normalization, list and table
//! structure, announced item counts, variant signals and alias tables.

pub mod alias;
pub mod lists;
pub mod normalize;
mod script;
pub mod table;
pub mod variants;

pub use alias::AliasTable;
pub use lists::{intro_text, is_list_format, list_item_count, parse_expected_count, split_into_list_items};
pub use normalize::{IdentityConverter, Normalizer, ScriptConverter, TableConverter, entity_key};
pub use variants::{
    adds_variant_signals, has_variant_signals, keys_differ_by_variant, residue_has_variant_signals, tokenize,
    variant_signals,
};
