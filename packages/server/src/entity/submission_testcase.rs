use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Testcases a submission was dispatched against, in dispatch order.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submission_testcase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub submission_id: i32,
    #[sea_orm(primary_key)]
    pub testcase_id: i32,
    pub position: i32,

    #[sea_orm(belongs_to, from = "submission_id", to = "id")]
    pub submission: Option<super::submission::Entity>,
    #[sea_orm(belongs_to, from = "testcase_id", to = "id")]
    pub testcase: Option<super::testcase::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
