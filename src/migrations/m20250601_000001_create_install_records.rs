use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(InstallRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InstallRecords::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(InstallRecords::Component)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(InstallRecords::Status)
                            .string()
                            .not_null()
                            .default("not_installed"),
                    )
                    .col(
                        ColumnDef::new(InstallRecords::Progress)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(InstallRecords::Message)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(InstallRecords::LastTransition)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InstallRecords::AccessUrls)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InstallRecords::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum InstallRecords {
    Table,
    Id,
    Component,
    Status,
    Progress,
    Message,
    LastTransition,
    AccessUrls,
}
