// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Editor-side derivations: which tags, metrics, operators and functions a
//! clause may offer, and the reducer applying form edits.

mod options;
mod reducer;

pub use options::{
    ClauseOptions, FunctionOption, SELECT_GROUP_BY_DISABLE_TAGS, SelectOption, TableOptions,
    clause_options, database_filter, function_options, sanitize, table_filter,
};
pub use reducer::{Edit, reduce};
