mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::TestApp;
use oficina_api::{
    entities::{MovementType, StockStatus},
    errors::ServiceError,
    services::inventory::{CreatePartRequest, RecordMovementRequest, UpdatePartRequest},
};
use uuid::Uuid;

fn part(codigo: &str, inicial: i32) -> CreatePartRequest {
    CreatePartRequest {
        codigo: codigo.to_string(),
        nome: format!("Peça {}", codigo),
        quantidade_minima: 2,
        quantidade_inicial: Some(inicial),
        ..Default::default()
    }
}

fn movement(tipo: MovementType, quantidade: i32) -> RecordMovementRequest {
    RecordMovementRequest {
        tipo_movimentacao: tipo,
        quantidade,
        motivo: None,
        ordem_servico_id: None,
    }
}

#[tokio::test]
async fn saida_beyond_stock_is_rejected_and_quantity_kept() {
    let app = TestApp::new().await;
    let created = app.parts().create_part(part("FLT-001", 3)).await.expect("part");

    let result = app
        .parts()
        .record_movement(created.id, movement(MovementType::Saida, 5))
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    let reloaded = app.parts().get_part(created.id).await.expect("part");
    assert_eq!(reloaded.quantidade_atual, 3);
    let history = app
        .parts()
        .list_movements(Some(created.id), 1, 20)
        .await
        .expect("movements");
    assert_eq!(history.total, 1, "only the opening balance is recorded");
}

#[tokio::test]
async fn entrada_adds_and_records_snapshot() {
    let app = TestApp::new().await;
    let created = app.parts().create_part(part("VEL-010", 3)).await.expect("part");

    let recorded = app
        .parts()
        .record_movement(created.id, movement(MovementType::Entrada, 10))
        .await
        .expect("entrada");

    assert_eq!(recorded.part.quantidade_atual, 13);
    assert_eq!(recorded.movement.tipo_movimentacao, "entrada");
    assert_eq!(recorded.movement.quantidade, 10);
    assert_eq!(recorded.movement.quantidade_anterior, 3);
    assert_eq!(recorded.movement.quantidade_nova, 13);
    assert_eq!(
        app.parts().get_part(created.id).await.expect("part").quantidade_atual,
        13
    );
}

#[tokio::test]
async fn ajuste_overwrites_quantity() {
    let app = TestApp::new().await;
    let created = app.parts().create_part(part("PAS-200", 12)).await.expect("part");

    let recorded = app
        .parts()
        .record_movement(created.id, movement(MovementType::Ajuste, 7))
        .await
        .expect("ajuste");

    assert_eq!(recorded.part.quantidade_atual, 7);
    assert_eq!(recorded.movement.quantidade_anterior, 12);
    assert_eq!(recorded.movement.quantidade_nova, 7);

    let zeroed = app
        .parts()
        .record_movement(created.id, movement(MovementType::Ajuste, 0))
        .await
        .expect("count to zero");
    assert_eq!(zeroed.part.quantidade_atual, 0);
    assert_eq!(zeroed.part.stock_status, StockStatus::Baixo);
}

#[tokio::test]
async fn zero_quantity_flows_are_rejected() {
    let app = TestApp::new().await;
    let created = app.parts().create_part(part("ZRO-001", 4)).await.expect("part");

    for tipo in [MovementType::Entrada, MovementType::Saida] {
        assert_matches!(
            app.parts().record_movement(created.id, movement(tipo, 0)).await,
            Err(ServiceError::ValidationError(_))
        );
    }
    assert_matches!(
        app.parts()
            .record_movement(Uuid::new_v4(), movement(MovementType::Entrada, 1))
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn opening_balance_is_booked_as_entrada() {
    let app = TestApp::new().await;
    let created = app.parts().create_part(part("AMO-050", 5)).await.expect("part");
    assert_eq!(created.quantidade_atual, 5);

    let history = app
        .parts()
        .list_movements(Some(created.id), 1, 20)
        .await
        .expect("movements");
    assert_eq!(history.total, 1);
    let opening = &history.items[0];
    assert_eq!(opening.tipo_movimentacao, "entrada");
    assert_eq!(opening.quantidade, 5);
    assert_eq!(opening.quantidade_anterior, 0);
    assert_eq!(opening.quantidade_nova, 5);

    let empty = app.parts().create_part(part("AMO-051", 0)).await.expect("part");
    assert_eq!(empty.quantidade_atual, 0);
    let history = app
        .parts()
        .list_movements(Some(empty.id), 1, 20)
        .await
        .expect("movements");
    assert_eq!(history.total, 0);
}

#[tokio::test]
async fn reversing_a_consumed_entrada_is_rejected() {
    let app = TestApp::new().await;
    let created = app.parts().create_part(part("RES-001", 0)).await.expect("part");
    let entrada = app
        .parts()
        .record_movement(created.id, movement(MovementType::Entrada, 10))
        .await
        .expect("entrada");
    app.parts()
        .record_movement(created.id, movement(MovementType::Saida, 8))
        .await
        .expect("saida");

    assert_matches!(
        app.parts().delete_movement(entrada.movement.id).await,
        Err(ServiceError::InsufficientStock(_))
    );
    assert_eq!(
        app.parts().get_part(created.id).await.expect("part").quantidade_atual,
        2
    );
    assert!(app.parts().get_movement(entrada.movement.id).await.is_ok());
}

#[tokio::test]
async fn reversing_a_saida_restores_stock() {
    let app = TestApp::new().await;
    let created = app.parts().create_part(part("RES-002", 10)).await.expect("part");
    let saida = app
        .parts()
        .record_movement(created.id, movement(MovementType::Saida, 4))
        .await
        .expect("saida");
    assert_eq!(saida.part.quantidade_atual, 6);

    let restored = app
        .parts()
        .delete_movement(saida.movement.id)
        .await
        .expect("reverse saida");
    assert_eq!(restored.quantidade_atual, 10);
    assert_matches!(
        app.parts().get_movement(saida.movement.id).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn reversing_a_superseded_ajuste_conflicts() {
    let app = TestApp::new().await;
    let created = app.parts().create_part(part("RES-003", 9)).await.expect("part");
    let ajuste = app
        .parts()
        .record_movement(created.id, movement(MovementType::Ajuste, 4))
        .await
        .expect("ajuste");
    app.parts()
        .record_movement(created.id, movement(MovementType::Entrada, 1))
        .await
        .expect("entrada");

    assert_matches!(
        app.parts().delete_movement(ajuste.movement.id).await,
        Err(ServiceError::Conflict(_))
    );

    app.parts()
        .record_movement(created.id, movement(MovementType::Saida, 1))
        .await
        .expect("saida");
    let restored = app
        .parts()
        .delete_movement(ajuste.movement.id)
        .await
        .expect("reverse ajuste");
    assert_eq!(restored.quantidade_atual, 9);
}

#[tokio::test]
async fn parts_with_history_cannot_be_deleted() {
    let app = TestApp::new().await;
    let stocked = app.parts().create_part(part("DEL-001", 1)).await.expect("part");
    assert_matches!(
        app.parts().delete_part(stocked.id).await,
        Err(ServiceError::Conflict(_))
    );

    let fresh = app.parts().create_part(part("DEL-002", 0)).await.expect("part");
    app.parts().delete_part(fresh.id).await.expect("delete");
    assert_matches!(
        app.parts().get_part(fresh.id).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn movements_are_listed_newest_first() {
    let app = TestApp::new().await;
    let created = app.parts().create_part(part("ORD-001", 0)).await.expect("part");

    for quantidade in [1, 2, 3] {
        app.parts()
            .record_movement(created.id, movement(MovementType::Entrada, quantidade))
            .await
            .expect("entrada");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let history = app
        .parts()
        .list_movements(Some(created.id), 1, 20)
        .await
        .expect("movements");
    let quantities: Vec<i32> = history.items.iter().map(|m| m.quantidade).collect();
    assert_eq!(quantities, vec![3, 2, 1]);
    assert_eq!(history.items[0].quantidade_nova, 6);
}

#[tokio::test]
async fn catalog_updates_never_touch_quantity() {
    let app = TestApp::new().await;
    let created = app.parts().create_part(part("CAT-001", 6)).await.expect("part");
    app.parts().create_part(part("CAT-002", 0)).await.expect("part");

    let updated = app
        .parts()
        .update_part(
            created.id,
            UpdatePartRequest {
                nome: Some("Filtro de ar".into()),
                quantidade_minima: Some(6),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.nome, "Filtro de ar");
    assert_eq!(updated.quantidade_atual, 6);
    assert_eq!(updated.stock_status, StockStatus::Baixo);

    assert_matches!(
        app.parts()
            .update_part(
                created.id,
                UpdatePartRequest {
                    codigo: Some("CAT-002".into()),
                    ..Default::default()
                },
            )
            .await,
        Err(ServiceError::Conflict(_))
    );

    let low = app.parts().list_low_stock().await.expect("low stock");
    let codes: Vec<&str> = low.iter().map(|p| p.codigo.as_str()).collect();
    assert!(codes.contains(&"CAT-001"));
    assert!(codes.contains(&"CAT-002"));
}

#[tokio::test]
async fn duplicate_part_codes_conflict() {
    let app = TestApp::new().await;
    app.parts().create_part(part("DUP-001", 0)).await.expect("part");
    assert_matches!(
        app.parts().create_part(part("DUP-001", 3)).await,
        Err(ServiceError::Conflict(_))
    );
}
