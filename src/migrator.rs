use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_ordens_servico_table::Migration),
            Box::new(m20240301_000002_create_itens_servico_table::Migration),
            Box::new(m20240301_000003_create_pecas_table::Migration),
            Box::new(m20240301_000004_create_movimentacoes_estoque_table::Migration),
        ]
    }
}

mod m20240301_000001_create_ordens_servico_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_ordens_servico_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrdensServico::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrdensServico::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrdensServico::Numero)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(OrdensServico::ClienteId).uuid().null())
                        .col(ColumnDef::new(OrdensServico::VeiculoId).uuid().null())
                        .col(ColumnDef::new(OrdensServico::Descricao).text().null())
                        .col(ColumnDef::new(OrdensServico::Status).string().not_null())
                        .col(
                            ColumnDef::new(OrdensServico::Desconto)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrdensServico::ValorTotal)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrdensServico::ValorFinal)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrdensServico::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrdensServico::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ordens_servico_status")
                        .table(OrdensServico::Table)
                        .col(OrdensServico::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ordens_servico_created_at")
                        .table(OrdensServico::Table)
                        .col(OrdensServico::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrdensServico::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrdensServico {
        Table,
        Id,
        Numero,
        ClienteId,
        VeiculoId,
        Descricao,
        Status,
        Desconto,
        ValorTotal,
        ValorFinal,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_itens_servico_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_itens_servico_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ItensServico::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ItensServico::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItensServico::OrdemServicoId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ItensServico::Descricao).string().not_null())
                        .col(ColumnDef::new(ItensServico::TipoItem).string().not_null())
                        .col(ColumnDef::new(ItensServico::TipoServicoId).uuid().null())
                        .col(ColumnDef::new(ItensServico::PecaId).uuid().null())
                        .col(
                            ColumnDef::new(ItensServico::Quantidade)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItensServico::ValorUnitario)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItensServico::ValorTotal)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItensServico::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItensServico::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_itens_servico_ordem_servico_id")
                                .from(ItensServico::Table, ItensServico::OrdemServicoId)
                                .to(OrdensServico::Table, OrdensServico::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_itens_servico_ordem_servico_id")
                        .table(ItensServico::Table)
                        .col(ItensServico::OrdemServicoId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ItensServico::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ItensServico {
        Table,
        Id,
        OrdemServicoId,
        Descricao,
        TipoItem,
        TipoServicoId,
        PecaId,
        Quantidade,
        ValorUnitario,
        ValorTotal,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrdensServico {
        Table,
        Id,
    }
}

mod m20240301_000003_create_pecas_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_pecas_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Pecas::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Pecas::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Pecas::Codigo)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Pecas::Nome).string().not_null())
                        .col(ColumnDef::new(Pecas::Descricao).text().null())
                        .col(
                            ColumnDef::new(Pecas::QuantidadeAtual)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Pecas::QuantidadeMinima)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Pecas::QuantidadeMaxima).integer().null())
                        .col(ColumnDef::new(Pecas::PrecoCusto).decimal_len(12, 2).null())
                        .col(ColumnDef::new(Pecas::PrecoVenda).decimal_len(12, 2).null())
                        .col(
                            ColumnDef::new(Pecas::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Pecas::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_pecas_nome")
                        .table(Pecas::Table)
                        .col(Pecas::Nome)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Pecas::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Pecas {
        Table,
        Id,
        Codigo,
        Nome,
        Descricao,
        QuantidadeAtual,
        QuantidadeMinima,
        QuantidadeMaxima,
        PrecoCusto,
        PrecoVenda,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_movimentacoes_estoque_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_movimentacoes_estoque_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MovimentacoesEstoque::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MovimentacoesEstoque::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MovimentacoesEstoque::PecaId).uuid().not_null())
                        .col(
                            ColumnDef::new(MovimentacoesEstoque::TipoMovimentacao)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MovimentacoesEstoque::Quantidade)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MovimentacoesEstoque::QuantidadeAnterior)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MovimentacoesEstoque::QuantidadeNova)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MovimentacoesEstoque::Motivo).text().null())
                        .col(
                            ColumnDef::new(MovimentacoesEstoque::OrdemServicoId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(MovimentacoesEstoque::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_movimentacoes_estoque_peca_id")
                                .from(MovimentacoesEstoque::Table, MovimentacoesEstoque::PecaId)
                                .to(Pecas::Table, Pecas::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_movimentacoes_estoque_peca_id")
                        .table(MovimentacoesEstoque::Table)
                        .col(MovimentacoesEstoque::PecaId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_movimentacoes_estoque_created_at")
                        .table(MovimentacoesEstoque::Table)
                        .col(MovimentacoesEstoque::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MovimentacoesEstoque::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MovimentacoesEstoque {
        Table,
        Id,
        PecaId,
        TipoMovimentacao,
        Quantidade,
        QuantidadeAnterior,
        QuantidadeNova,
        Motivo,
        OrdemServicoId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Pecas {
        Table,
        Id,
    }
}
